//! Diagnostics command.

use crate::telegram::TelegramClient;
use anyhow::Result;
use colored::Colorize;
use songbot_core::BotConfig;
use std::path::Path;

pub async fn execute(config_override: Option<&Path>) -> Result<()> {
    println!("{}", "songbot Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check config file
    print!("  Config file: ");
    let config_path = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(BotConfig::config_path);
    if config_path.exists() {
        println!("{}", format!("✓ {}", config_path.display()).green());
    } else if config_override.is_some() {
        println!("{}", "✗ not found".red());
        issues.push(format!("{} does not exist", config_path.display()));
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    print!("  Config values: ");
    let config = match BotConfig::load(config_override) {
        Ok(config) => {
            println!("{}", "✓ valid".green());
            config
        }
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push("Configuration is invalid; remaining checks use defaults".to_string());
            BotConfig::default()
        }
    };

    // Check acquisition tool
    print!("  {}: ", config.acquisition.program);
    match which::which(&config.acquisition.program) {
        Ok(path) => println!("{}", format!("✓ {}", path.display()).green()),
        Err(_) => {
            println!("{}", "✗ not found".red());
            issues.push(format!("{} is not installed", config.acquisition.program));
        }
    }

    // Check workspace root
    print!("  Workspace root: ");
    match check_writable(&config.workspace.root).await {
        Ok(()) => println!("{}", format!("✓ {}", config.workspace.root.display()).green()),
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push(format!(
                "Workspace root {} is not writable",
                config.workspace.root.display()
            ));
        }
    }

    // Check token and API
    print!("  Bot token: ");
    match config.resolve_token() {
        Ok(token) => {
            println!("{}", "✓ found".green());
            print!("  Telegram API: ");
            match check_api(&token, &config).await {
                Ok(name) => println!("{}", format!("✓ connected as @{}", name).green()),
                Err(e) => {
                    println!("{}", format!("✗ {}", e).red());
                    issues.push("Cannot reach the Telegram Bot API".to_string());
                }
            }
        }
        Err(_) => {
            println!("{}", "✗ missing".red());
            issues.push("Set TELEGRAM_TOKEN in .env, the environment or config.toml".to_string());
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}

async fn check_writable(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root).await?;
    let probe = root.join(".songbot-doctor");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

async fn check_api(token: &str, config: &BotConfig) -> Result<String> {
    let client = TelegramClient::new(token, &config.telegram)?;
    let me = client.get_me().await?;
    Ok(me.username.unwrap_or_else(|| me.id.to_string()))
}
