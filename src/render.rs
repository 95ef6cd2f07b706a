//! Transcript rendering
//!
//! ```text
//! =================
//! Input Text: Hello
//! =================
//! Output Text: Hi there
//! ```

use std::io::Write;
use log::trace;

use crate::error::Error;

pub const INPUT_LABEL: &str = "Input Text: ";
pub const OUTPUT_LABEL: &str = "Output Text: ";

/// `=` repeated once per char of `"Input Text: {input}"`
pub fn separator(input: &str) -> String
{   let n = INPUT_LABEL.chars().count() + input.chars().count();
    "=".repeat(n)
}

/// The four transcript lines, each newline-terminated
pub fn transcript(
  input: &str
, output: &str
) -> String
{   let sep = separator(input);
    format!(
      "{sep}\n{INPUT_LABEL}{input}\n{sep}\n{OUTPUT_LABEL}{output}\n"
    )
}

pub fn write_transcript<W: Write>(
  out: &mut W
, input: &str
, output: &str
) -> Result<(), Error>
{   trace!("Writing transcript ({} bytes of output)", output.len());
    out.write_all(transcript(input, output).as_bytes())?;
    out.flush()?;
    Ok(())
}
