use log::debug;

use azchat::{prompt_from_args, ClientConfig};

async fn run() -> Result<(), azchat::Error>
{   let config = ClientConfig::from_env()?;
    let prompt = prompt_from_args(std::env::args().skip(1));
    let mut stdout = std::io::stdout().lock();
    azchat::run(config, &prompt, &mut stdout).await
}

#[tokio::main]
async fn main()
{   let dotenv_result = dotenv::dotenv();
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("warn")
    ).init();

    match dotenv_result
    {   Ok(path) => debug!("Loaded {}", path.display())
      , Err(e) => debug!("No .env loaded: {}", e)
    }

    if let Err(e) = run().await
    {   eprintln!("azchat: {}", e);
        std::process::exit(1);
    }
}
