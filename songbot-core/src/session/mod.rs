//! Download-and-delivery sessions.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ────── invalid URL ───────────┐
//!   │                                   │
//!   ▼                                   │
//! Downloading ── tool failure ──────────┤
//!   │                                   │
//!   ▼                                   │
//! Collecting ─── no artifacts ──────────┤
//!   │                                   │
//!   ▼                                   ▼
//! Delivering ─── nothing delivered ──► Failed
//!   │
//!   ▼
//! Completed
//! ```
//!
//! Both terminal states release the session workspace.

mod orchestrator;
mod types;

pub use orchestrator::SessionOrchestrator;
pub use types::*;
