//! Resumable, strictly sequential upload of a folder to one archive item.
//!
//! Each file is either not yet attempted this run, confirmed uploaded, or
//! failed. The checkpoint is written after every attempt, so the on-disk
//! state always matches the last completed transfer. Two failure modes are
//! handled differently:
//!
//! * a rejected transfer (the remote answered with a failure status) marks
//!   the file failed and the run moves on to the next file;
//! * a transfer error (no answer at all) marks the file failed, saves the
//!   checkpoint and stops the run. Re-running resumes from the checkpoint.

use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{all_succeeded, ArchiveClient, TransferResponse};
use crate::checkpoint::{CheckpointStore, UploadCheckpoint};
use crate::config::UploadOptions;
use crate::cover::{CoverGenerator, COVER_FILE_NAME};
use crate::metadata::ItemMetadata;
use crate::utils::file_name_of;
use crate::ArchiverError;

/// Everything the driver needs to upload one folder
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub folder: PathBuf,
    pub identifier: String,
    pub metadata: ItemMetadata,
    /// Audio files in upload order
    pub files: Vec<PathBuf>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// Every file is on the remote side; the checkpoint is gone
    Complete,
    /// All files were attempted but some were rejected; the checkpoint stays
    Failed,
    /// A transfer error stopped the run; the checkpoint records progress
    Aborted { file: String, reason: String },
}

/// Result of one driver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub identifier: String,
    pub status: UploadStatus,
    /// Files confirmed during this run
    pub uploaded: Vec<String>,
    /// Files rejected or errored during this run
    pub failed: Vec<String>,
    /// Files never attempted because the run stopped
    pub pending: usize,
    /// Files confirmed across all runs
    pub total_uploaded: usize,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Complete
    }
}

/// Files of `files` whose names are not yet in the checkpoint, in order
pub fn resume_set(files: &[PathBuf], checkpoint: &UploadCheckpoint) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|path| match file_name_of(path) {
            Some(name) => !checkpoint.is_uploaded(&name),
            None => false,
        })
        .cloned()
        .collect()
}

/// Drives the upload of one item
pub struct UploadDriver {
    archive: Arc<dyn ArchiveClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    cover: Option<Arc<dyn CoverGenerator>>,
    options: UploadOptions,
    progress: ProgressBar,
}

impl UploadDriver {
    pub fn new(
        archive: Arc<dyn ArchiveClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        options: UploadOptions,
    ) -> Self {
        Self {
            archive,
            checkpoints,
            cover: None,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Generator used when `options.generate_cover` is set
    pub fn with_cover(mut self, cover: Arc<dyn CoverGenerator>) -> Self {
        self.cover = Some(cover);
        self
    }

    /// Bar that per-file outcomes are printed through
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// The files a run would transfer right now, without transferring them
    pub fn plan(&self, request: &UploadRequest) -> Result<Vec<PathBuf>, ArchiverError> {
        let checkpoint = self.checkpoints.load(&request.identifier)?;
        Ok(resume_set(&request.files, &checkpoint))
    }

    /// Upload the files of `request` that the checkpoint does not list yet
    pub async fn run(&self, request: &UploadRequest) -> Result<UploadReport, ArchiverError> {
        let identifier = request.identifier.as_str();
        let mut checkpoint = self.checkpoints.load(identifier)?;
        let resuming = !checkpoint.is_fresh();

        let mut queue = resume_set(&request.files, &checkpoint);
        let mut report = UploadReport {
            identifier: identifier.to_string(),
            status: UploadStatus::Complete,
            uploaded: Vec::new(),
            failed: Vec::new(),
            pending: 0,
            total_uploaded: checkpoint.uploaded_files.len(),
        };

        if queue.is_empty() {
            tracing::info!("Nothing left to upload for {}", identifier);
            self.checkpoints.clear(identifier)?;
            return Ok(report);
        }

        if resuming {
            tracing::info!(
                "Resuming {}: {} already uploaded, {} remaining",
                identifier,
                checkpoint.uploaded_files.len(),
                queue.len()
            );
        }

        if let Some(cover) = self.prepare_cover(request, &checkpoint).await {
            queue.insert(0, cover);
        }

        // Diagnostic list describes this attempt only
        checkpoint.failed_files.clear();

        // Only the very first transfer of a new item carries item metadata
        let mut item_metadata = if resuming {
            None
        } else {
            Some(request.metadata.clone())
        };

        self.progress.set_length(queue.len() as u64);
        self.progress.set_position(0);

        for (index, path) in queue.iter().enumerate() {
            let name = file_name_of(path).unwrap_or_else(|| path.display().to_string());
            self.progress.set_message(name.clone());

            let outcome = self
                .archive
                .upload(identifier, std::slice::from_ref(path), item_metadata.take())
                .await;

            match outcome {
                Ok(responses) if all_succeeded(&responses) => {
                    checkpoint.mark_uploaded(&name);
                    self.checkpoints.save(identifier, &checkpoint)?;
                    report.uploaded.push(name.clone());
                    self.say(format!("  [OK] {}", name));
                }
                Ok(responses) => {
                    checkpoint.mark_failed(&name);
                    self.checkpoints.save(identifier, &checkpoint)?;
                    report.failed.push(name.clone());
                    let reason = describe_rejection(&responses);
                    self.say(format!("  [FAILED] {} ({})", name, reason));
                    tracing::warn!("Upload of {} rejected: {}", name, reason);
                }
                Err(e) => {
                    checkpoint.mark_failed(&name);
                    self.checkpoints.save(identifier, &checkpoint)?;
                    report.failed.push(name.clone());
                    report.pending = queue.len() - index - 1;
                    report.total_uploaded = checkpoint.uploaded_files.len();
                    report.status = UploadStatus::Aborted {
                        file: name.clone(),
                        reason: e.to_string(),
                    };
                    self.say(format!("  [ERROR] {}: {}", name, e));
                    tracing::error!(
                        "Upload of {} interrupted, progress saved; re-run to resume: {}",
                        name,
                        e
                    );
                    return Ok(report);
                }
            }

            self.progress.inc(1);
        }

        report.total_uploaded = checkpoint.uploaded_files.len();

        if checkpoint.failed_files.is_empty() {
            self.checkpoints.clear(identifier)?;
            report.status = UploadStatus::Complete;
        } else {
            tracing::warn!(
                "{} file(s) failed for {}, checkpoint kept for retry",
                checkpoint.failed_files.len(),
                identifier
            );
            report.status = UploadStatus::Failed;
        }

        Ok(report)
    }

    /// Print a line without tearing the progress bar
    fn say(&self, line: String) {
        self.progress.suspend(|| println!("{}", line));
    }

    /// Cover image to send first, if wanted and not uploaded before.
    /// Failures only cost the cover.
    async fn prepare_cover(
        &self,
        request: &UploadRequest,
        checkpoint: &UploadCheckpoint,
    ) -> Option<PathBuf> {
        if !self.options.generate_cover || checkpoint.is_uploaded(COVER_FILE_NAME) {
            return None;
        }
        let generator = self.cover.as_ref()?;

        match generator
            .generate(&request.folder, &request.metadata.creator)
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Cover generation failed, continuing without it: {:#}", e);
                None
            }
        }
    }
}

fn describe_rejection(responses: &[TransferResponse]) -> String {
    if responses.is_empty() {
        return "no response".to_string();
    }

    responses
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| match &r.message {
            Some(message) => format!("HTTP {}: {}", r.status, message),
            None => format!("HTTP {}", r.status),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Names of `files`, for reporting
pub fn file_names(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|p| file_name_of(p))
        .collect()
}
