//! Artifact collection from a session workspace.

use crate::acquisition::AudioFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Finds produced audio files directly inside a workspace.
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    extension: String,
}

impl ArtifactCollector {
    /// Collector for files ending in `.<extension>` (compared case-insensitively).
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn for_format(format: AudioFormat) -> Self {
        Self::new(format.extension())
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// List matching regular files, in directory listing order.
    ///
    /// Subdirectories are not searched. An unreadable workspace yields an
    /// empty list.
    pub async fn collect(&self, workspace: &Path) -> Vec<PathBuf> {
        let mut entries = match tokio::fs::read_dir(workspace).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list workspace {:?}: {}", workspace, e);
                return Vec::new();
            }
        };

        let mut artifacts = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry in {:?}: {}", workspace, e);
                    break;
                }
            };

            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file && self.matches(&entry.path()) {
                artifacts.push(entry.path());
            }
        }

        debug!(
            "Collected {} .{} artifact(s) from {:?}",
            artifacts.len(),
            self.extension,
            workspace
        );
        artifacts
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}
