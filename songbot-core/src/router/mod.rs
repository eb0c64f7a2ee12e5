//! Classification of inbound messages.
//!
//! The router decides what an incoming text message turns into. Only
//! [`Route::Download`] reaches the session pipeline; every other route is a
//! fixed reply (or nothing).

use crate::acquisition::is_valid_source_url;
use crate::auth::{is_authorized, AuthConfig};
use crate::session::{messages, ConversationId, MessageId, SessionRequest};

/// A text message received from the platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub text: String,
    pub username: Option<String>,
}

/// What to do with an inbound message.
#[derive(Debug, Clone)]
pub enum Route {
    /// `/start`
    Welcome,
    /// Empty text or an unknown command
    Ignore,
    Unauthorized,
    /// Text that is not an http(s) URL
    InvalidUrl,
    Download(SessionRequest),
}

impl Route {
    /// Fixed reply for routes that never reach a session.
    pub fn reply_text(&self) -> Option<&'static str> {
        match self {
            Route::Welcome => Some(messages::WELCOME),
            Route::Unauthorized => Some(messages::UNAUTHORIZED),
            Route::InvalidUrl => Some(messages::INVALID_URL),
            Route::Ignore | Route::Download(_) => None,
        }
    }
}

/// Routes inbound messages using an immutable auth configuration.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    auth: AuthConfig,
}

impl RequestRouter {
    pub fn new(auth: AuthConfig) -> Self {
        Self { auth }
    }

    pub fn route(&self, message: &InboundMessage) -> Route {
        let text = message.text.trim();
        if text.is_empty() {
            return Route::Ignore;
        }

        if let Some(command) = text.strip_prefix('/') {
            // "/start", "/start@SomeBot", "/start payload"
            let name = command
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('@')
                .next()
                .unwrap_or("");
            return if name == "start" {
                Route::Welcome
            } else {
                Route::Ignore
            };
        }

        if !is_authorized(message.conversation_id, &self.auth) {
            return Route::Unauthorized;
        }

        if !is_valid_source_url(text) {
            return Route::InvalidUrl;
        }

        Route::Download(SessionRequest {
            conversation_id: message.conversation_id,
            message_id: message.message_id,
            source_url: text.to_string(),
            username: message.username.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: ConversationId(10),
            message_id: MessageId(20),
            text: text.to_string(),
            username: Some("listener".to_string()),
        }
    }

    #[test]
    fn test_url_becomes_download() {
        let router = RequestRouter::new(AuthConfig::default());
        match router.route(&message("  https://open.spotify.com/track/abc \n")) {
            Route::Download(request) => {
                assert_eq!(request.source_url, "https://open.spotify.com/track/abc");
                assert_eq!(request.session_id().as_str(), "c10-m20");
            }
            other => panic!("unexpected route: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_is_invalid_url() {
        let router = RequestRouter::new(AuthConfig::default());
        let route = router.route(&message("never gonna give you up"));
        assert!(matches!(route, Route::InvalidUrl));
        assert_eq!(route.reply_text(), Some(messages::INVALID_URL));
    }

    #[test]
    fn test_start_command_variants() {
        let router = RequestRouter::new(AuthConfig::default());
        assert!(matches!(router.route(&message("/start")), Route::Welcome));
        assert!(matches!(router.route(&message("/start@SongBot")), Route::Welcome));
        assert!(matches!(router.route(&message("/help")), Route::Ignore));
        assert!(matches!(router.route(&message("   ")), Route::Ignore));
    }

    #[test]
    fn test_auth_gate_applies_before_url_check() {
        let router = RequestRouter::new(AuthConfig {
            enabled: true,
            allowed_conversations: vec![99],
        });
        assert!(matches!(
            router.route(&message("https://x.test/t")),
            Route::Unauthorized
        ));
        assert!(matches!(router.route(&message("/start")), Route::Welcome));
    }
}
