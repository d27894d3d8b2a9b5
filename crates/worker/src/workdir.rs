//! The worker's scratch directory and its two sentinel files.
//!
//! `WORKING` exists while an iteration is in progress so the pod's
//! pre-stop hook can wait for it. The hook writes `TERMINATING` to ask the
//! worker to stop before its next poll. Cleanup never touches either.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const WORKING: &str = "WORKING";
pub const TERMINATING: &str = "TERMINATING";

fn is_sentinel(name: &str) -> bool {
    name == WORKING || name == TERMINATING
}

#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove every entry except the sentinels.
    ///
    /// A missing directory is logged and treated as already empty.
    pub async fn empty_except_sentinels(&self) -> std::io::Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(dir = %self.root.display(), "Working directory not found");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_str().is_some_and(is_sentinel) {
                continue;
            }
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Clean the directory and write `WORKING`.
    ///
    /// Failures are logged and the iteration carries on. The returned guard
    /// removes `WORKING` when dropped.
    pub async fn begin_iteration(&self) -> WorkingGuard {
        if let Err(e) = self.empty_except_sentinels().await {
            tracing::error!(dir = %self.root.display(), error = %e, "Error cleaning up working directory");
        }
        if let Err(e) = tokio::fs::write(self.root.join(WORKING), "1").await {
            tracing::error!(dir = %self.root.display(), error = %e, "Error creating WORKING file");
        }
        WorkingGuard {
            path: self.root.join(WORKING),
        }
    }

    /// Whether the pre-stop hook has asked the worker to stop.
    pub fn termination_requested(&self) -> bool {
        self.root.join(TERMINATING).exists()
    }

    /// Consume a pending termination request.
    ///
    /// `TERMINATING` is deleted so a restarted worker does not stop again
    /// immediately. Returns whether a request was pending.
    pub async fn take_termination_request(&self) -> bool {
        let path = self.root.join(TERMINATING);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return false;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::error!(error = %e, "Error removing TERMINATING file, will still quit");
        }
        true
    }
}

/// Removes `WORKING` on drop, including while unwinding.
#[must_use = "WORKING is removed as soon as the guard is dropped"]
pub struct WorkingGuard {
    path: PathBuf,
}

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "WORKING file already gone");
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to delete WORKING file");
            }
        }
    }
}
