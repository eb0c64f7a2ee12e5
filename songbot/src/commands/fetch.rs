//! Local download without messaging.
//!
//! Runs the same allocate, fetch, collect and release steps as a chat
//! session, then copies the audio into a local directory.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use songbot_core::acquisition::{is_valid_source_url, AcquisitionResult, Acquirer, ToolInvoker};
use songbot_core::artifact::ArtifactCollector;
use songbot_core::session::{ConversationId, MessageId, SessionId};
use songbot_core::workspace::{Workspace, WorkspaceAllocator};
use songbot_core::BotConfig;
use std::path::{Path, PathBuf};

pub async fn execute(url: &str, out: &Path, config: &BotConfig) -> Result<()> {
    if !is_valid_source_url(url) {
        bail!("Not an http(s) URL: {}", url);
    }

    // Local runs have no chat; conversation 0 keeps them apart from real ones.
    let session_id = SessionId::new(
        ConversationId(0),
        MessageId(chrono::Utc::now().timestamp_millis()),
    );
    let workspace = WorkspaceAllocator::new(&config.workspace.root)
        .allocate(&session_id)
        .await?;

    println!("{} {}", "Downloading".cyan().bold(), url);
    let copied = download_into(&workspace, url, out, config).await;

    workspace
        .release()
        .await
        .context("Failed to release workspace")?;

    let copied = copied?;
    println!();
    println!(
        "{}",
        format!("✓ {} file(s) saved to {}", copied.len(), out.display())
            .green()
            .bold()
    );
    for path in &copied {
        println!("  • {}", path.display());
    }

    Ok(())
}

async fn download_into(
    workspace: &Workspace,
    url: &str,
    out: &Path,
    config: &BotConfig,
) -> Result<Vec<PathBuf>> {
    let invoker = ToolInvoker::from_config(&config.acquisition);
    if let AcquisitionResult::Failure(failure) = invoker
        .fetch(workspace.path(), url, &config.acquisition.options)
        .await
    {
        bail!("Download failed: {}", failure);
    }

    let collector = ArtifactCollector::for_format(config.acquisition.options.format);
    let artifacts = collector.collect(workspace.path()).await;
    if artifacts.is_empty() {
        bail!("The tool produced no .{} files", collector.extension());
    }

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let mut copied = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let Some(name) = artifact.file_name() else {
            continue;
        };
        let target = out.join(name);
        tokio::fs::copy(artifact, &target)
            .await
            .with_context(|| format!("Failed to copy {}", artifact.display()))?;
        copied.push(target);
    }

    Ok(copied)
}
