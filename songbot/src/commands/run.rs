//! Serve requests from Telegram.

use crate::dispatcher::Dispatcher;
use crate::telegram::TelegramClient;
use anyhow::{Context, Result};
use songbot_core::acquisition::ToolInvoker;
use songbot_core::{BotConfig, SessionOrchestrator};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn execute(config: BotConfig) -> Result<()> {
    let config = Arc::new(config);

    let token = config
        .resolve_token()
        .context("Cannot start without a bot token")?;
    let client = Arc::new(TelegramClient::new(&token, &config.telegram)?);

    let me = client
        .get_me()
        .await
        .context("Failed to reach the Telegram Bot API")?;
    info!(
        "Connected as @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );

    tokio::fs::create_dir_all(&config.workspace.root)
        .await
        .with_context(|| {
            format!(
                "Failed to create workspace root {}",
                config.workspace.root.display()
            )
        })?;

    let acquirer = Arc::new(ToolInvoker::from_config(&config.acquisition));
    if which::which(acquirer.program()).is_err() {
        warn!(
            "{} not found on PATH; every download will fail",
            acquirer.program().display()
        );
    }

    let orchestrator = SessionOrchestrator::new(&config, acquirer, client.clone());
    Dispatcher::new(client, &config, orchestrator).run().await
}
