use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use when2solve::config::{Cli, Command};
use when2solve::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = cli.config;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("when2solve={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("Starting when2solve service");

            let server = Server::new(&config)
                .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

            server
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
        Command::Extract { file } => {
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let dataset = when2solve::extract(&html)
                .ok_or_else(|| anyhow::anyhow!("No scheduling data found in {}", file.display()))?;

            println!("{}", serde_json::to_string(&dataset)?);
        }
    }

    Ok(())
}
