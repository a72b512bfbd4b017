//! Per-identifier upload checkpoints.
//!
//! A checkpoint records which files of an item have been confirmed on the
//! remote side, so an interrupted upload can resume without re-sending them.
//! One JSON file per identifier:
//!
//! ```json
//! {"uploaded_files": ["01.mp3"], "failed_files": ["02.mp3"]}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ArchiverError;

/// Upload progress for one identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    /// Files confirmed uploaded. Only ever grows within a run.
    #[serde(default)]
    pub uploaded_files: BTreeSet<String>,

    /// Files that failed on the most recent attempt (diagnostic only)
    #[serde(default)]
    pub failed_files: Vec<String>,
}

impl UploadCheckpoint {
    pub fn is_uploaded(&self, file_name: &str) -> bool {
        self.uploaded_files.contains(file_name)
    }

    pub fn mark_uploaded(&mut self, file_name: &str) {
        self.uploaded_files.insert(file_name.to_string());
    }

    pub fn mark_failed(&mut self, file_name: &str) {
        self.failed_files.push(file_name.to_string());
    }

    /// Nothing has been confirmed uploaded yet
    pub fn is_fresh(&self) -> bool {
        self.uploaded_files.is_empty()
    }
}

/// Persistence for upload checkpoints
#[cfg_attr(test, mockall::automock)]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, or an empty one if none is stored
    fn load(&self, identifier: &str) -> Result<UploadCheckpoint, ArchiverError>;

    /// Replace the stored checkpoint
    fn save(&self, identifier: &str, checkpoint: &UploadCheckpoint) -> Result<(), ArchiverError>;

    /// Remove the stored checkpoint; absent is fine
    fn clear(&self, identifier: &str) -> Result<(), ArchiverError>;

    /// Whether any record is stored, even one without confirmed files
    fn exists(&self, identifier: &str) -> Result<bool, ArchiverError>;
}

/// JSON files under a directory, one per identifier
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.json", identifier))
    }

    fn lock_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", identifier))
    }

    /// Take the exclusive lock for `identifier`.
    ///
    /// Two runs against the same identifier would race on the checkpoint
    /// file, so the second one fails with [`ArchiverError::CheckpointLocked`].
    /// A lock left behind by a killed process has to be removed by hand.
    pub fn lock(&self, identifier: &str) -> Result<CheckpointLock, ArchiverError> {
        fs_err::create_dir_all(&self.dir)?;
        let path = self.lock_path(identifier);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(CheckpointLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ArchiverError::CheckpointLocked(identifier.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, identifier: &str) -> Result<UploadCheckpoint, ArchiverError> {
        let path = self.path_for(identifier);
        if !path.exists() {
            return Ok(UploadCheckpoint::default());
        }

        let content = fs_err::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|source| ArchiverError::CorruptCheckpoint { path, source })
    }

    fn save(&self, identifier: &str, checkpoint: &UploadCheckpoint) -> Result<(), ArchiverError> {
        fs_err::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec_pretty(checkpoint).map_err(std::io::Error::from)?;
        atomic_write(&self.path_for(identifier), &data)?;
        tracing::debug!(
            "Checkpoint saved for {}: {} uploaded, {} failed",
            identifier,
            checkpoint.uploaded_files.len(),
            checkpoint.failed_files.len()
        );
        Ok(())
    }

    fn clear(&self, identifier: &str) -> Result<(), ArchiverError> {
        match fs_err::remove_file(self.path_for(identifier)) {
            Ok(()) => {
                tracing::debug!("Checkpoint cleared for {}", identifier);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, identifier: &str) -> Result<bool, ArchiverError> {
        Ok(self.path_for(identifier).try_exists()?)
    }
}

/// Write to a sibling temp file, fsync, then rename over `path`.
/// A crash leaves either the old or the new content, never a torn file.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("checkpoint"),
        uuid::Uuid::new_v4()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs_err::File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs_err::rename(&temp_path, path) {
        let _ = fs_err::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Held while an upload runs; removes the lock file on drop
#[derive(Debug)]
pub struct CheckpointLock {
    path: PathBuf,
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Checkpoints held in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, UploadCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a checkpoint as if a previous run had stored it
    pub fn with_checkpoint(identifier: &str, checkpoint: UploadCheckpoint) -> Self {
        let store = Self::default();
        if let Ok(mut records) = store.records.lock() {
            records.insert(identifier.to_string(), checkpoint);
        }
        store
    }

    /// Stored checkpoint, `None` if cleared or never saved
    pub fn get(&self, identifier: &str) -> Option<UploadCheckpoint> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(identifier).cloned())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, identifier: &str) -> Result<UploadCheckpoint, ArchiverError> {
        Ok(self.get(identifier).unwrap_or_default())
    }

    fn save(&self, identifier: &str, checkpoint: &UploadCheckpoint) -> Result<(), ArchiverError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ArchiverError::Io(std::io::Error::other("checkpoint store poisoned")))?;
        records.insert(identifier.to_string(), checkpoint.clone());
        Ok(())
    }

    fn clear(&self, identifier: &str) -> Result<(), ArchiverError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ArchiverError::Io(std::io::Error::other("checkpoint store poisoned")))?;
        records.remove(identifier);
        Ok(())
    }

    fn exists(&self, identifier: &str) -> Result<bool, ArchiverError> {
        Ok(self.get(identifier).is_some())
    }
}
