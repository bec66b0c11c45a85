//! Run-scoped artifact naming and cleanup bookkeeping.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of one pipeline run and the directory its artifacts live in.
///
/// Artifact names combine the run id with the chunk index, so concurrent runs (in one
/// process or across invocations) never collide.
#[derive(Debug, Clone)]
pub struct RunScope {
    id: Uuid,
    dir: PathBuf,
}

impl RunScope {
    /// Create a scope with a fresh random id.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { id: Uuid::new_v4(), dir: dir.into() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Location of the audio artifact for chunk `index`.
    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("piper-speak-{}-{}.wav", self.id, index))
    }
}

/// Artifact locations that still have to be removed from storage.
///
/// Owned by the pipeline's control task. Dropping the ledger first cancels `writers`,
/// then removes anything still tracked. A writer that finishes after the drop sees the
/// cancellation and removes its own output, so every exit path cleans up.
#[derive(Debug, Default)]
pub struct ArtifactLedger {
    paths: BTreeSet<PathBuf>,
    writers: CancellationToken,
}

impl ArtifactLedger {
    /// Create a ledger that cancels `writers` when dropped.
    pub fn new(writers: CancellationToken) -> Self {
        Self { paths: BTreeSet::new(), writers }
    }

    /// Start tracking a location. Call before anything may be written there.
    pub fn track(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    /// Remove the artifact now and stop tracking it.
    pub fn release(&mut self, path: &Path) {
        self.paths.remove(path);
        remove_artifact(path);
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every tracked artifact.
    ///
    /// # Returns
    /// The number of files actually deleted.
    pub fn sweep(&mut self) -> usize {
        let tracked = std::mem::take(&mut self.paths);
        let removed = tracked.iter().filter(|path| remove_artifact(path)).count();
        if !tracked.is_empty() {
            debug!("Swept {} of {} tracked artifact(s)", removed, tracked.len());
        }
        removed
    }
}

impl Drop for ArtifactLedger {
    fn drop(&mut self) {
        self.writers.cancel();
        self.sweep();
    }
}

/// Delete an artifact file. A file that was never written counts as removed.
///
/// # Returns
/// `true` if a file was deleted.
pub fn remove_artifact(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
