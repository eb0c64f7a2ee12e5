//! Authorization gate for inbound requests.
//!
//! The gate is disabled by default. When enabled, only conversations listed in
//! `allowed_conversations` may use the bot. The check is a pure function of the
//! conversation and the (immutable) configuration.

use crate::session::ConversationId;
use serde::{Deserialize, Serialize};

/// Authorization settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether the allow-list is enforced
    #[serde(default)]
    pub enabled: bool,

    /// Conversations allowed to use the bot when enforcement is on
    #[serde(default)]
    pub allowed_conversations: Vec<i64>,
}

/// Check whether a conversation may use the bot.
pub fn is_authorized(conversation_id: ConversationId, config: &AuthConfig) -> bool {
    !config.enabled || config.allowed_conversations.contains(&conversation_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_gate_allows_everyone() {
        let config = AuthConfig::default();
        assert!(is_authorized(ConversationId(1), &config));
        assert!(is_authorized(ConversationId(-100200300), &config));
    }

    #[test]
    fn test_enabled_gate_uses_allow_list() {
        let config = AuthConfig {
            enabled: true,
            allowed_conversations: vec![7, -42],
        };
        assert!(is_authorized(ConversationId(7), &config));
        assert!(is_authorized(ConversationId(-42), &config));
        assert!(!is_authorized(ConversationId(8), &config));
    }

    #[test]
    fn test_enabled_gate_with_empty_list_denies() {
        let config = AuthConfig {
            enabled: true,
            allowed_conversations: Vec::new(),
        };
        assert!(!is_authorized(ConversationId(7), &config));
    }
}
