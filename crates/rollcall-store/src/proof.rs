//! Proof-image storage.
//!
//! Every admitted attendance keeps the raw accepted frame on disk; the
//! record references the file. The image is written before the record is
//! committed, and removed again if the record insert fails.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Filesystem store for accepted attendance frames.
pub struct ProofImageStore {
    dir: PathBuf,
}

impl ProofImageStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write raw frame bytes under a fresh UUID name, returning the path.
    pub fn store(&self, frame: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.join(format!("{}.jpg", Uuid::new_v4()));
        std::fs::write(&path, frame)?;
        tracing::debug!(path = %path.display(), bytes = frame.len(), "stored proof image");
        Ok(path)
    }

    /// Remove a previously stored proof image (rollback path).
    pub fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
