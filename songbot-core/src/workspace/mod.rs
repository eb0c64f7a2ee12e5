//! Per-session workspace directories.
//!
//! Every session gets its own directory under the configured root, named from
//! its [`SessionId`]. Workspaces are paired resources:
//! - `allocate` creates the directory (or reuses an empty leftover)
//! - `Workspace::release` removes it and everything beneath it
//! - dropping an unreleased `Workspace` removes it synchronously
//!
//! No operation here touches the process-wide current directory.

use crate::error::{Error, Result};
use crate::session::SessionId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name prefix for session workspaces
const WORKSPACE_PREFIX: &str = ".session-";

/// Creates session workspaces under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceAllocator {
    root: PathBuf,
}

impl WorkspaceAllocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic workspace path for a session.
    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(format!("{}{}", WORKSPACE_PREFIX, session_id))
    }

    /// Create the workspace for a session.
    ///
    /// An existing empty directory at the target path is reused. Anything else
    /// already at that path is an allocation error.
    pub async fn allocate(&self, session_id: &SessionId) -> Result<Workspace> {
        let path = self.path_for(session_id);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::allocation(&self.root, e.to_string()))?;

        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_empty_dir(&path).await {
                    return Err(Error::allocation(
                        &path,
                        "path already exists and is not an empty directory",
                    ));
                }
                debug!("Reusing empty workspace at {:?}", path);
            }
            Err(e) => return Err(Error::allocation(&path, e.to_string())),
        }

        debug!("Allocated workspace {:?} for session {}", path, session_id);
        Ok(Workspace {
            path,
            released: false,
        })
    }
}

async fn is_empty_dir(path: &Path) -> bool {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

/// Recursively remove a workspace directory.
///
/// Removing a path that does not exist is not an error.
pub async fn release(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Released workspace {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::release(path, e)),
    }
}

/// A live session workspace.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the workspace and everything beneath it.
    pub async fn release(mut self) -> Result<()> {
        let result = release(&self.path).await;
        self.released = true;
        result
    }
}

// Reached only when a session panics or its task is cancelled. Removal is
// blocking and may run on a runtime worker thread; the directory is gone
// by the time drop returns.
impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!("Released abandoned workspace {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release abandoned workspace {:?}: {}", self.path, e),
        }
    }
}
