//! Lecture Archiver - A Rust CLI tool for publishing audio lecture folders
//!
//! This library tags lecture folders with ID3 metadata, generates a cover thumbnail,
//! and uploads the folder to archive.org one file at a time, keeping a JSON checkpoint
//! so an interrupted upload resumes where it left off.

pub mod archive;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod cover;
pub mod history;
pub mod library;
pub mod metadata;
pub mod mover;
pub mod output;
pub mod pipeline;
pub mod sync;
pub mod tagging;
pub mod upload;
pub mod utils;

use std::path::PathBuf;

pub use archive::{ArchiveClient, IaArchiveClient, TransferError, TransferResponse};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, UploadCheckpoint};
pub use cli::{Cli, Commands};
pub use config::{Config, UploadOptions};
pub use history::{HistoryStore, UploadHistoryRecord};
pub use metadata::ItemMetadata;
pub use pipeline::{FolderOutcome, FolderPipeline};
pub use upload::{UploadDriver, UploadReport, UploadRequest, UploadStatus};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the archiver
#[derive(thiserror::Error, Debug)]
pub enum ArchiverError {
    #[error("Not a directory: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("Checkpoint {} is corrupt: {source}", path.display())]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Another upload holds the lock for {0}")]
    CheckpointLocked(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not move {} to {}: {reason}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive request failed: {0}")]
    Remote(String),
}
