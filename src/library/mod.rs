//! Enumerates the audio files of a lecture folder.

use std::path::{Path, PathBuf};

use crate::ArchiverError;

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
        }
    }
}

/// Ensure `folder` exists and is a directory
pub fn ensure_folder(folder: &Path) -> Result<(), ArchiverError> {
    if folder.is_dir() {
        Ok(())
    } else {
        Err(ArchiverError::InvalidInput(folder.to_path_buf()))
    }
}

/// List the audio files directly inside `folder`, sorted by file name.
///
/// Sub-directories and files with unrecognised extensions are ignored.
pub fn list_audio_files(folder: &Path) -> Result<Vec<PathBuf>, ArchiverError> {
    ensure_folder(folder)?;

    let mut files = Vec::new();
    for entry in fs_err::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && AudioFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Immediate sub-directories of `root`, sorted
pub fn list_folders(root: &Path) -> Result<Vec<PathBuf>, ArchiverError> {
    ensure_folder(root)?;

    let mut folders = Vec::new();
    for entry in fs_err::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            folders.push(path);
        }
    }

    folders.sort();
    Ok(folders)
}
