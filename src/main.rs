mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use endpoint_indexer::engine::DiscoveryEngine;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "endpoint_indexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let engine = DiscoveryEngine::new(cli.engine_config());

    match &cli.command {
        Commands::Discover { path, format } => {
            cli::discover(&engine, path, *format).await?;
        }
        Commands::Watch { path } => {
            cli::watch(&engine, path).await?;
        }
        Commands::Manifest { path, format } => {
            cli::manifest(&engine, path, *format)?;
        }
        Commands::Frameworks { path } => {
            cli::frameworks(&engine, path).await?;
        }
    }

    Ok(())
}
