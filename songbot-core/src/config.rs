//! Configuration management for songbot.
//!
//! Configuration is loaded once at startup from (highest precedence first):
//! 1. An explicit path (`--config`)
//! 2. `SONGBOT_CONFIG`
//! 3. `<data dir>/config.toml`
//! 4. Default values
//!
//! The bot token is resolved separately, see [`BotConfig::resolve_token`].

use crate::acquisition::AcquisitionOptions;
use crate::auth::AuthConfig;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable (and `.env` key) holding the bot token
pub const TOKEN_ENV_VAR: &str = "TELEGRAM_TOKEN";

/// Lower bound for the pause between two delivered artifacts
pub const MIN_INTER_ITEM_DELAY_MS: u64 = 300;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// External acquisition tool settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Artifact delivery settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Per-session workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Authorization stub
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (lowest precedence source)
    #[serde(default)]
    pub token: Option<String>,

    /// Base URL of the Bot API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Pause between two getUpdates calls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-request timeout for audio uploads
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Back-off after a failed getUpdates call
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Program name or path of the acquisition tool
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the download arguments
    #[serde(default)]
    pub program_args: Vec<String>,

    /// Hard limit on a single acquisition run
    #[serde(default = "default_acquisition_timeout")]
    pub timeout_secs: u64,

    /// Options forwarded to the tool
    #[serde(flatten)]
    pub options: AcquisitionOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Largest file the platform accepts
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: u64,

    /// Pause between two delivered artifacts
    #[serde(default = "default_inter_item_delay")]
    pub inter_item_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory of all session workspaces
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on concurrently live sessions
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

// Default value functions
fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    300
}

fn default_upload_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_program() -> String {
    "spotdl".to_string()
}

fn default_acquisition_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_max_payload() -> u64 {
    50 * 1024 * 1024
}

fn default_inter_item_delay() -> u64 {
    MIN_INTER_ITEM_DELAY_MS
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("songbot-workspaces")
}

fn default_max_concurrent_sessions() -> usize {
    4
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "songbot", "songbot") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".songbot")
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            poll_interval_ms: default_poll_interval(),
            upload_timeout_secs: default_upload_timeout(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            timeout_secs: default_acquisition_timeout(),
            options: AcquisitionOptions::default(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload(),
            inter_item_delay_ms: default_inter_item_delay(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_concurrent_sessions(),
        }
    }
}

impl AcquisitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DeliveryConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}

impl BotConfig {
    /// Load configuration from an explicit path, or the default location.
    ///
    /// A missing file at the default location yields defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No config file at {:?}, using defaults", default_path);
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SONGBOT_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Reject values the session pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.acquisition.program.trim().is_empty() {
            return Err(Error::Config("acquisition.program must not be empty".into()));
        }
        if self.acquisition.options.parallelism == 0 {
            return Err(Error::Config("acquisition.parallelism must be at least 1".into()));
        }
        if self.acquisition.options.bitrate.trim().is_empty() {
            return Err(Error::Config("acquisition.bitrate must not be empty".into()));
        }
        if self.acquisition.timeout_secs == 0 {
            return Err(Error::Config("acquisition.timeout_secs must be positive".into()));
        }
        if self.delivery.max_payload_bytes == 0 {
            return Err(Error::Config("delivery.max_payload_bytes must be positive".into()));
        }
        if self.delivery.inter_item_delay_ms < MIN_INTER_ITEM_DELAY_MS {
            return Err(Error::Config(format!(
                "delivery.inter_item_delay_ms must be at least {}",
                MIN_INTER_ITEM_DELAY_MS
            )));
        }
        if self.dispatch.max_concurrent_sessions == 0 {
            return Err(Error::Config(
                "dispatch.max_concurrent_sessions must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the bot token: `.env` in the working directory, then the
    /// `TELEGRAM_TOKEN` environment variable, then `[telegram] token`.
    pub fn resolve_token(&self) -> Result<String> {
        let dotenv = std::fs::read_to_string(".env").ok();
        let env = std::env::var(TOKEN_ENV_VAR).ok();
        resolve_token_from(dotenv.as_deref(), env.as_deref(), self.telegram.token.as_deref())
    }
}

/// Pick the first non-empty token from the three sources.
pub fn resolve_token_from(
    dotenv: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> Result<String> {
    dotenv
        .and_then(dotenv_token)
        .or_else(|| env.map(str::trim).filter(|t| !t.is_empty()).map(String::from))
        .or_else(|| config.map(str::trim).filter(|t| !t.is_empty()).map(String::from))
        .ok_or(Error::MissingToken)
}

/// Value of the token key in `.env` content; the last assignment wins.
fn dotenv_token(content: &str) -> Option<String> {
    dotenvy::from_read_iter(content.as_bytes())
        .filter_map(|item| match item {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!("Skipping malformed .env line: {}", e);
                None
            }
        })
        .filter(|(key, _)| key == TOKEN_ENV_VAR)
        .map(|(_, value)| value.trim().to_string())
        .last()
        .filter(|value| !value.is_empty())
}
