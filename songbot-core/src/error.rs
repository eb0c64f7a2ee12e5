//! Error types for songbot-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using songbot-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for songbot operations
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telegram token not found. Set TELEGRAM_TOKEN in .env, the environment, or config.toml.")]
    MissingToken,

    // Workspace errors
    #[error("Failed to allocate workspace {path}: {reason}")]
    Allocation { path: PathBuf, reason: String },

    #[error("Failed to release workspace {path}: {source}")]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Messaging errors
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create an allocation error for a workspace path
    pub fn allocation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Allocation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a release error for a workspace path
    pub fn release(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Release {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
