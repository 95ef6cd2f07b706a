use std::path::PathBuf;
use clap::{Parser, Subcommand};
use log::{debug, info};

use azchat::powerbi::{ExportFormat, PowerBiClient, PowerBiConfig};
use azchat::Error;

/// Power BI workspace helper: report lookup and export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli
{   #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command
{   /// Print a report and the tables of its dataset
    Report
    {   /// Report id; defaults to REPORT_ID
        #[arg(long)]
        report_id: Option<String>
    }
  , /// Export a report and save the file
    Export
    {   /// Report id; defaults to REPORT_ID
        #[arg(long)]
        report_id: Option<String>
      , /// pdf, pptx or png
        #[arg(long, default_value = "pdf")]
        format: ExportFormat
      , /// Output path; defaults to <report_id>.<ext>
        #[arg(long)]
        output: Option<PathBuf>
    }
}

fn pick_report_id(
  arg: Option<String>
, config: &PowerBiConfig
) -> Result<String, Error>
{   arg.or_else(|| config.report_id().map(str::to_string))
      .ok_or_else(|| {
        Error::InvalidConfiguration(
          "no report id: pass --report-id or set REPORT_ID".to_string()
        )
      })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, Error>
{   serde_json::to_string_pretty(value)
      .map_err(|e| Error::ParseError(e.to_string()))
}

async fn run(cli: Cli) -> Result<(), Error>
{   let config = PowerBiConfig::from_env()?;
    let client = PowerBiClient::new(config);
    let token = client.access_token().await?;

    match cli.command
    {   Command::Report { report_id } => {
          let report_id = pick_report_id(report_id, client.config())?;
          let report = client.get_report(&token, &report_id).await?;
          println!("{}", to_json(&report)?);
          let tables = client
            .get_dataset_tables(&token, &report.dataset_id)
            .await?;
          println!("{}", to_json(&tables)?);
        }
      , Command::Export { report_id, format, output } => {
          let report_id = pick_report_id(report_id, client.config())?;
          let bytes = client.export_report(&token, &report_id, format).await?;
          let path = output.unwrap_or_else(|| {
            PathBuf::from(format!("{}.{}", report_id, format.extension()))
          });
          tokio::fs::write(&path, &bytes).await?;
          info!("Wrote {} bytes to {}", bytes.len(), path.display());
          println!("{}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main()
{   let dotenv_result = dotenv::dotenv();
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    match dotenv_result
    {   Ok(path) => debug!("Loaded {}", path.display())
      , Err(e) => debug!("No .env loaded: {}", e)
    }

    if let Err(e) = run(Cli::parse()).await
    {   eprintln!("powerbi: {}", e);
        std::process::exit(1);
    }
}
