//! Error types for the songbot binary.

use thiserror::Error;

/// Telegram Bot API errors.
#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i32, description: String },

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

// Request URLs embed the bot token, so they are stripped before the error
// can reach a log line.
impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Http(e.without_url())
    }
}

impl From<TelegramError> for songbot_core::Error {
    fn from(e: TelegramError) -> Self {
        songbot_core::Error::Transport(e.to_string())
    }
}

/// Result type alias for Telegram operations.
pub type TelegramResult<T> = Result<T, TelegramError>;
