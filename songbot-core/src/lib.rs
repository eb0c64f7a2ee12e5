//! songbot-core - Core library for songbot
//!
//! This crate provides the per-request download-and-delivery pipeline:
//!
//! - **router**: Classifies inbound messages
//! - **session**: Session types and the orchestrator
//! - **workspace**: Per-session directory allocation and release
//! - **acquisition**: External download tool invocation
//! - **artifact**: Collection of produced audio files
//! - **delivery**: Sending artifacts to a conversation
//! - **auth**: Authorization gate
//! - **config**: Bot configuration

pub mod acquisition;
pub mod artifact;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod router;
pub mod session;
pub mod workspace;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::{Error, Result};
pub use session::SessionOrchestrator;
