//! songbot - Telegram song download bot
//!
//! Receives links in chat, runs the download tool in a per-request
//! workspace and sends the resulting audio back.

use anyhow::Result;
use clap::Parser;
use songbot_core::BotConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod dispatcher;
mod error;
mod telegram;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("songbot=info".parse()?)
        .add_directive("songbot_core=info".parse()?);
    if cli.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Run => commands::run::execute(BotConfig::load(cli.config.as_deref())?).await,
        Commands::Doctor => commands::doctor::execute(cli.config.as_deref()).await,
        Commands::Fetch { url, out } => {
            let config = BotConfig::load(cli.config.as_deref())?;
            commands::fetch::execute(&url, &out, &config).await
        }
        Commands::Version => {
            println!("songbot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
