pub mod error;
pub mod config;
pub mod request;
pub mod client;
pub mod render;
pub mod powerbi;

use std::io::Write;
use log::debug;

pub use client::AzureChatClient;
pub use config::ClientConfig;
pub use error::Error;
pub use request::{ChatMessage, ChatResponse, Role};

/*

azchat sends one prompt to an Azure OpenAI chat deployment and prints
an input/output transcript.

azchat/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and the run pipeline
│   ├── main.rs         # Binary: .env, logging, exit status
│   ├── error.rs        # Error enum
│   ├── config.rs       # Endpoint/deployment/api-version/key
│   ├── request.rs      # Chat request/response wire types
│   ├── client.rs       # HTTP dispatch
│   ├── render.rs       # Transcript formatting
│   ├── powerbi.rs      # Power BI token, report, tables, export
│   └── bin/powerbi.rs  # Binary: report / export subcommands
└── tests/

*/

/// Prompt used when none is given on the command line
pub const DEFAULT_PROMPT: &str
  = "Can I use PowerBI's REST API to help me with my data analysis with you?";

/// Command-line words joined by spaces, or `DEFAULT_PROMPT` when none
pub fn prompt_from_args<I>(args: I) -> String
where I: IntoIterator<Item = String>
{   let args: Vec<String> = args.into_iter().collect();
    if args.is_empty()
    {   DEFAULT_PROMPT.to_string()
    } else
    {   args.join(" ")
    }
}

/// Send `prompt` once and write the transcript to `out`.
/// Nothing is written unless a completion was extracted.
pub async fn run<W: Write>(
  config: ClientConfig
, prompt: &str
, out: &mut W
) -> Result<(), Error>
{   debug!("Running single completion");
    let client = AzureChatClient::new(config);
    let output = client.complete(prompt).await?;
    render::write_transcript(out, prompt, &output)
}
