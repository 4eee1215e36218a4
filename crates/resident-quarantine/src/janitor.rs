//! Per-request temporary upload cleanup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files deleted by the sweep.
    pub removed: usize,
    /// Files the application had already moved or deleted.
    pub already_gone: usize,
    /// Files that could not be deleted (logged, then forgotten).
    pub failed: usize,
}

impl SweepReport {
    /// Total files the sweep took responsibility for.
    pub fn total(&self) -> usize {
        self.removed + self.already_gone + self.failed
    }
}

/// Tracks temporary upload copies created for the current request.
///
/// Every path is handed to [`UploadJanitor::track`] the moment its file is
/// created, so a request that fails half way through still gets every file
/// it produced cleaned up. A sweep drains the list: each path is deleted at
/// most once.
#[derive(Debug, Default)]
pub struct UploadJanitor {
    pending: Vec<PathBuf>,
}

impl UploadJanitor {
    /// Create an empty janitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take responsibility for deleting `path`.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.pending.push(path.into());
    }

    /// Paths awaiting deletion.
    pub fn pending(&self) -> &[PathBuf] {
        &self.pending
    }

    /// Delete every tracked file. "Already gone" counts as success.
    pub async fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        for path in self.pending.drain(..) {
            match remove(&path).await {
                Removal::Removed => report.removed += 1,
                Removal::AlreadyGone => report.already_gone += 1,
                Removal::Failed => report.failed += 1,
            }
        }

        report
    }
}

enum Removal {
    Removed,
    AlreadyGone,
    Failed,
}

async fn remove(path: &Path) -> Removal {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Removal::Removed,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "upload already moved or deleted");
            Removal::AlreadyGone
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not delete temporary upload");
            Removal::Failed
        }
    }
}
