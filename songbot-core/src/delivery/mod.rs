//! Artifact delivery to a conversation.
//!
//! The [`Messenger`] trait is the narrow seam to the messaging platform. The
//! [`DeliveryAdapter`] sends artifacts one by one through it:
//! - items go out in collector order with a fixed pause between them
//! - files above the platform limit are skipped and reported
//! - a failed item is recorded and the next one is still attempted

use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::session::ConversationId;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, conversation_id: ConversationId, text: &str) -> Result<()>;

    /// Upload an audio file.
    async fn send_audio(&self, conversation_id: ConversationId, path: &Path) -> Result<()>;
}

/// Per-item delivery failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailureReason {
    /// File exceeds the platform limit and was not uploaded
    PayloadTooLarge { size: u64, limit: u64 },
    /// File metadata could not be read
    Unreadable(String),
    /// The platform refused or the upload broke off
    Rejected(String),
}

impl fmt::Display for DeliveryFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailureReason::PayloadTooLarge { size, limit } => {
                write!(f, "payload too large ({} > {} bytes)", size, limit)
            }
            DeliveryFailureReason::Unreadable(e) => write!(f, "unreadable: {}", e),
            DeliveryFailureReason::Rejected(e) => write!(f, "rejected: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub path: PathBuf,
    pub reason: DeliveryFailureReason,
}

/// Summary of one delivery run.
///
/// `attempted` counts every artifact handed to the adapter, including the ones
/// rejected before upload (e.g. too large).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// Nothing at all reached the conversation.
    pub fn nothing_delivered(&self) -> bool {
        self.succeeded == 0
    }

    /// Some, but not all, artifacts were delivered.
    pub fn is_partial(&self) -> bool {
        self.succeeded > 0 && self.succeeded < self.attempted
    }
}

/// Sends collected artifacts through a [`Messenger`].
#[derive(Clone)]
pub struct DeliveryAdapter {
    messenger: Arc<dyn Messenger>,
    max_payload_bytes: u64,
    inter_item_delay: Duration,
}

impl DeliveryAdapter {
    pub fn new(messenger: Arc<dyn Messenger>, config: &DeliveryConfig) -> Self {
        Self {
            messenger,
            max_payload_bytes: config.max_payload_bytes,
            inter_item_delay: config.inter_item_delay(),
        }
    }

    /// Deliver every artifact, continuing past individual failures.
    pub async fn deliver(
        &self,
        conversation_id: ConversationId,
        artifacts: &[PathBuf],
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (index, path) in artifacts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.inter_item_delay).await;
            }
            report.attempted += 1;

            match self.deliver_one(conversation_id, path).await {
                Ok(()) => {
                    debug!("Delivered {:?} to {}", path, conversation_id);
                    report.succeeded += 1;
                }
                Err(reason) => {
                    warn!("Failed to deliver {:?} to {}: {}", path, conversation_id, reason);
                    report.failures.push(DeliveryFailure {
                        path: path.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Delivered {}/{} artifact(s) to {}",
            report.succeeded, report.attempted, conversation_id
        );
        report
    }

    async fn deliver_one(
        &self,
        conversation_id: ConversationId,
        path: &Path,
    ) -> std::result::Result<(), DeliveryFailureReason> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| DeliveryFailureReason::Unreadable(e.to_string()))?
            .len();

        if size > self.max_payload_bytes {
            return Err(DeliveryFailureReason::PayloadTooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }

        self.messenger
            .send_audio(conversation_id, path)
            .await
            .map_err(|e| DeliveryFailureReason::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Records uploads; fails the uploads whose position is listed.
    #[derive(Default)]
    struct RecordingMessenger {
        uploads: Mutex<Vec<PathBuf>>,
        fail_at: Vec<usize>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_text(&self, _conversation_id: ConversationId, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn send_audio(&self, _conversation_id: ConversationId, path: &Path) -> Result<()> {
            let mut uploads = self.uploads.lock().unwrap();
            let position = uploads.len();
            uploads.push(path.to_path_buf());
            if self.fail_at.contains(&position) {
                return Err(Error::Transport("upload refused".into()));
            }
            Ok(())
        }
    }

    fn write_tracks(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, b"ID3").unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_artifact_delivered() {
        let temp = tempdir().unwrap();
        let tracks = write_tracks(temp.path(), &["track.mp3"]);
        let messenger = Arc::new(RecordingMessenger::default());
        let adapter = DeliveryAdapter::new(messenger.clone(), &DeliveryConfig::default());

        let report = adapter.deliver(ConversationId(1), &tracks).await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert!(report.failures.is_empty());
        assert_eq!(messenger.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_in_the_middle_does_not_abort() {
        let temp = tempdir().unwrap();
        let tracks = write_tracks(temp.path(), &["a.mp3", "b.mp3", "c.mp3"]);
        let messenger = Arc::new(RecordingMessenger {
            fail_at: vec![1],
            ..Default::default()
        });
        let adapter = DeliveryAdapter::new(messenger.clone(), &DeliveryConfig::default());

        let report = adapter.deliver(ConversationId(1), &tracks).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert!(report.is_partial());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, tracks[1]);
        assert_eq!(*messenger.uploads.lock().unwrap(), tracks);
    }

    #[tokio::test]
    async fn test_oversized_file_is_not_uploaded() {
        let temp = tempdir().unwrap();
        let tracks = write_tracks(temp.path(), &["small.mp3"]);
        let big = temp.path().join("big.mp3");
        std::fs::write(&big, vec![0u8; 64]).unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let config = DeliveryConfig {
            max_payload_bytes: 16,
            ..Default::default()
        };
        let adapter = DeliveryAdapter::new(messenger.clone(), &config);

        let report = adapter
            .deliver(ConversationId(1), &[big.clone(), tracks[0].clone()])
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(
            report.failures[0].reason,
            DeliveryFailureReason::PayloadTooLarge { size: 64, limit: 16 }
        );
        assert_eq!(*messenger.uploads.lock().unwrap(), vec![tracks[0].clone()]);
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let temp = tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::default());
        let adapter = DeliveryAdapter::new(messenger, &DeliveryConfig::default());

        let report = adapter
            .deliver(ConversationId(1), &[temp.path().join("vanished.mp3")])
            .await;

        assert!(report.nothing_delivered());
        assert!(matches!(
            report.failures[0].reason,
            DeliveryFailureReason::Unreadable(_)
        ));
    }

    #[tokio::test]
    async fn test_items_are_spaced_out() {
        let temp = tempdir().unwrap();
        let tracks = write_tracks(temp.path(), &["a.mp3", "b.mp3", "c.mp3"]);
        let messenger = Arc::new(RecordingMessenger::default());
        let adapter = DeliveryAdapter::new(messenger, &DeliveryConfig::default());

        let started = Instant::now();
        adapter.deliver(ConversationId(1), &tracks).await;

        // two gaps between three items
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let messenger = Arc::new(RecordingMessenger::default());
        let adapter = DeliveryAdapter::new(messenger, &DeliveryConfig::default());

        let report = adapter.deliver(ConversationId(1), &[]).await;
        assert_eq!(report, DeliveryReport::default());
    }
}
