//! Session identity, state and outcome types.

use crate::delivery::DeliveryReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Messaging-platform chat identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

/// Identifier of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of one request, usable as a directory name.
///
/// Rendered as `c<conversation>-m<message>`; negative ids (group chats) use an
/// `n` prefix instead of `-` so the separator stays unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(conversation_id: ConversationId, message_id: MessageId) -> Self {
        Self(format!(
            "c{}-m{}",
            signed_component(conversation_id.0),
            signed_component(message_id.0)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn signed_component(value: i64) -> String {
    if value < 0 {
        format!("n{}", value.unsigned_abs())
    } else {
        value.to_string()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A download request accepted by the router.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub source_url: String,
    /// Sender handle, for logging only
    pub username: Option<String>,
}

impl SessionRequest {
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.conversation_id, self.message_id)
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Downloading,
    Collecting,
    Delivering,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Whether the state machine allows `from -> to`.
pub fn can_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    matches!(
        (from, to),
        (Created, Downloading)
            | (Created, Failed)
            | (Downloading, Collecting)
            | (Downloading, Failed)
            | (Collecting, Delivering)
            | (Collecting, Failed)
            | (Delivering, Completed)
            | (Delivering, Failed)
    )
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Downloading => "downloading",
            SessionState::Collecting => "collecting",
            SessionState::Delivering => "delivering",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One live request, from routing to release.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub conversation_id: ConversationId,
    pub source_url: String,
    /// Set once the workspace is allocated
    pub workspace_path: Option<PathBuf>,
    pub state: SessionState,
    /// Filled after acquisition completes
    pub artifacts: Vec<PathBuf>,
}

impl Session {
    pub fn new(request: &SessionRequest) -> Self {
        Self {
            id: request.session_id(),
            conversation_id: request.conversation_id,
            source_url: request.source_url.clone(),
            workspace_path: None,
            state: SessionState::Created,
            artifacts: Vec::new(),
        }
    }

    /// Move to `next`. Transitions outside the state machine are logged and
    /// ignored.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !can_transition(self.state, next) {
            warn!(
                "Session {}: ignoring transition {} -> {}",
                self.id, self.state, next
            );
            return false;
        }
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        true
    }
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidUrl,
    Allocation,
    Acquisition,
    NoArtifacts,
    NothingDelivered,
}

impl FailureReason {
    /// The single diagnostic text sent to the conversation.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::InvalidUrl => messages::INVALID_URL,
            FailureReason::Allocation | FailureReason::Acquisition => messages::DOWNLOAD_FAILED,
            FailureReason::NoArtifacts => messages::NO_ARTIFACTS,
            FailureReason::NothingDelivered => messages::NOTHING_DELIVERED,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::InvalidUrl => "invalid_url",
            FailureReason::Allocation => "allocation",
            FailureReason::Acquisition => "acquisition",
            FailureReason::NoArtifacts => "no_artifacts",
            FailureReason::NothingDelivered => "nothing_delivered",
        };
        f.write_str(s)
    }
}

/// What the orchestrator reports back once a session is over.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    /// Always terminal
    pub state: SessionState,
    pub failure: Option<FailureReason>,
    /// Present once delivery was attempted
    pub report: Option<DeliveryReport>,
    /// Whether the workspace is gone (false only when release itself failed)
    pub workspace_released: bool,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}

/// User-facing texts.
pub mod messages {
    pub const WELCOME: &str = "🎵 Welcome to the Song Downloader Bot! 🎵";
    pub const UNAUTHORIZED: &str = "⚠️ You are not authorized to use this bot.";
    pub const DOWNLOADING: &str = "🔍 Downloading";
    pub const INVALID_URL: &str = "❌ Invalid URL. Please provide a valid song URL.";
    pub const DOWNLOAD_FAILED: &str = "❌ Download failed. Please try again later.";
    pub const NO_ARTIFACTS: &str = "❌ Unable to find the requested song.";
    pub const NOTHING_DELIVERED: &str = "❌ Could not send any of the downloaded songs.";
}
