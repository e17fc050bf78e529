//! Persisted reconciliation checkpoint.
//!
//! The checkpoint is the highest update id that has been accounted for
//! (processed or deliberately skipped). It is read once per pass, only
//! ever moves forward, and is written after every update.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur reading or writing the checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint file is corrupt ({path}): {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Checkpoint cannot move backwards: {current} → {attempted}")]
    Regression { current: i64, attempted: i64 },

    #[error("Another reconciliation pass holds the lock: {0}")]
    Locked(PathBuf),
}

/// High-water mark of accounted-for update ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint(i64);

impl Checkpoint {
    pub fn new(update_id: i64) -> Self {
        Self(update_id)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether an update id is still ahead of the checkpoint
    pub fn is_pending(self, update_id: i64) -> bool {
        update_id > self.0
    }

    /// Move forward to `update_id`. Returns false (and stays put) otherwise.
    pub fn advance(&mut self, update_id: i64) -> bool {
        if update_id > self.0 {
            self.0 = update_id;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable checkpoint storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint (default 0 when never written)
    async fn load(&self) -> Result<Checkpoint, CheckpointError>;

    /// Persist the checkpoint. Rejects values lower than the stored one.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;
}

/// On-disk representation
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    last_update_id: i64,
    updated_at: DateTime<Utc>,
}

/// JSON-file checkpoint, replaced atomically on each save
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_sync(path: &Path) -> Result<Checkpoint, CheckpointError> {
        if !path.exists() {
            return Ok(Checkpoint::default());
        }

        let content = std::fs::read_to_string(path)?;
        let file: CheckpointFile = serde_json::from_str(&content).map_err(|e| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Checkpoint(file.last_update_id))
    }

    fn write_sync(path: &Path, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let current = Self::read_sync(path)?;
        if checkpoint < current {
            return Err(CheckpointError::Regression {
                current: current.value(),
                attempted: checkpoint.value(),
            });
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let body = serde_json::to_string_pretty(&CheckpointFile {
            last_update_id: checkpoint.value(),
            updated_at: Utc::now(),
        })
        .map_err(|e| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Write to a sibling temp file, then rename over the old checkpoint
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CheckpointError::Io(e.error))?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_sync(&path))
            .await
            .map_err(|e| CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_sync(&path, checkpoint))
            .await
            .map_err(|e| CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

/// Exclusive advisory lock held for the duration of a pass.
///
/// Passes are assumed to be serialized; this turns an overlapping
/// scheduler run into an immediate error instead of double counting.
pub struct PassLock {
    file: std::fs::File,
    path: PathBuf,
}

impl PassLock {
    /// Try to take the lock without blocking
    pub fn acquire(path: &Path) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| CheckpointError::Locked(path.to_path_buf()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut checkpoint = Checkpoint::new(100);

        assert!(checkpoint.advance(103));
        assert!(!checkpoint.advance(101));
        assert!(!checkpoint.advance(103));
        assert_eq!(checkpoint.value(), 103);

        assert!(checkpoint.is_pending(104));
        assert!(!checkpoint.is_pending(103));
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(Checkpoint::default().value(), 0);
    }
}
