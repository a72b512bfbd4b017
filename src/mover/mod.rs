use std::path::{Path, PathBuf};

use crate::ArchiverError;

/// Move `folder` into `done_root`, creating the root if needed.
///
/// Refuses to overwrite an existing destination. Returns the new path.
pub fn move_to_done(folder: &Path, done_root: &Path) -> Result<PathBuf, ArchiverError> {
    let name = folder.file_name().ok_or_else(|| ArchiverError::MoveFailed {
        from: folder.to_path_buf(),
        to: done_root.to_path_buf(),
        reason: "source has no folder name".to_string(),
    })?;
    let destination = done_root.join(name);

    let fail = |reason: String| ArchiverError::MoveFailed {
        from: folder.to_path_buf(),
        to: destination.clone(),
        reason,
    };

    if !folder.is_dir() {
        return Err(fail("source is not a directory".to_string()));
    }

    if destination.exists() {
        return Err(fail("destination already exists".to_string()));
    }

    fs_err::create_dir_all(done_root).map_err(|e| fail(e.to_string()))?;
    fs_err::rename(folder, &destination).map_err(|e| fail(e.to_string()))?;

    tracing::info!("Moved {} to {}", folder.display(), destination.display());
    Ok(destination)
}
