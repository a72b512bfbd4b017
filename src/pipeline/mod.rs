use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::archive::{ArchiveClient, IaArchiveClient};
use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::{Config, UploadOptions};
use crate::cover::{FfmpegCoverGenerator, COVER_FILE_NAME};
use crate::history::{HistoryStore, UploadHistoryRecord};
use crate::library::{ensure_folder, list_audio_files, list_folders};
use crate::metadata::{generate_identifier, item_url, ItemMetadata};
use crate::mover::move_to_done;
use crate::output;
use crate::tagging::{AudioTagger, LoftyTagger, TagDefaults};
use crate::upload::{file_names, UploadDriver, UploadReport, UploadRequest};
use crate::utils::format_file_size;

/// Flags for one `process` invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub tag_only: bool,
    pub upload_only: bool,
    pub dry_run: bool,
    pub skip_thumbnail: bool,
}

/// What happened to a folder
#[derive(Debug)]
pub enum FolderOutcome {
    /// `--tag-only` run finished
    Tagged,
    /// Dry run: nothing was changed
    Previewed,
    /// Already uploaded earlier; nothing to do
    Skipped { identifier: String, reason: String },
    /// Every file is on archive.org
    Uploaded {
        report: UploadReport,
        moved_to: Option<PathBuf>,
    },
    /// Upload stopped or had rejections; re-run to continue
    Incomplete(UploadReport),
}

impl FolderOutcome {
    /// Skipped folders were not uploaded by this run, so they do not count
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            FolderOutcome::Incomplete(_) | FolderOutcome::Skipped { .. }
        )
    }
}

/// Tag, upload, record and move lecture folders
pub struct FolderPipeline {
    config: Config,
    upload_options: UploadOptions,
    archive: Arc<dyn ArchiveClient>,
    checkpoints: Arc<FileCheckpointStore>,
    history: HistoryStore,
    tagger: Box<dyn AudioTagger>,
    quiet: bool,
}

impl FolderPipeline {
    /// Create a pipeline talking to archive.org
    pub fn new(config: Config, quiet: bool) -> Result<Self> {
        let archive = Arc::new(
            IaArchiveClient::from_config(&config).context("Failed to create archive.org client")?,
        );
        Ok(Self::with_parts(config, archive, Box::new(LoftyTagger::new()), quiet))
    }

    /// Create a pipeline with explicit collaborators
    pub fn with_parts(
        config: Config,
        archive: Arc<dyn ArchiveClient>,
        tagger: Box<dyn AudioTagger>,
        quiet: bool,
    ) -> Self {
        let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint_dir()));
        let history = HistoryStore::new(config.history_path());
        Self {
            upload_options: config.upload_options(),
            config,
            archive,
            checkpoints,
            history,
            tagger,
            quiet,
        }
    }

    /// Process every folder under the configured input directory.
    /// Returns `(succeeded, total)`.
    pub async fn process_all(&self, options: &ProcessOptions) -> Result<(usize, usize)> {
        let input = &self.config.folders.input;
        if !input.is_dir() {
            println!("Input folder not found: {}", input.display());
            return Ok((0, 0));
        }

        let folders = list_folders(input)?;
        if folders.is_empty() {
            println!("No folders to process!");
            return Ok((0, 0));
        }

        println!("Found {} folders to process\n", folders.len());

        let mut succeeded = 0;
        for folder in &folders {
            match self.process_folder(folder, options).await {
                Ok(outcome) if outcome.is_success() => succeeded += 1,
                Ok(_) => {}
                Err(e) => {
                    println!("Error: {:#}", e);
                    tracing::error!("Processing {} failed: {:#}", folder.display(), e);
                }
            }
            println!();
        }

        println!(
            "\nProcessed {}/{} folders successfully",
            succeeded,
            folders.len()
        );
        Ok((succeeded, folders.len()))
    }

    /// Run one folder through tag, upload and move
    pub async fn process_folder(&self, folder: &Path, options: &ProcessOptions) -> Result<FolderOutcome> {
        ensure_folder(folder)?;
        let folder_name = folder_name(folder)?;

        output::print_banner(&format!("Processing: {}", folder_name));

        if !options.upload_only {
            self.step_tag(folder, options.dry_run);
        }

        if options.tag_only {
            println!("\n[DONE] Metadata updated (--tag-only mode)");
            return Ok(FolderOutcome::Tagged);
        }

        let outcome = self.step_upload(folder, &folder_name, options).await?;

        let outcome = match outcome {
            FolderOutcome::Uploaded { report, .. } => {
                let moved_to = if self.upload_options.auto_move {
                    self.step_move(folder)
                } else {
                    None
                };
                FolderOutcome::Uploaded { report, moved_to }
            }
            other => other,
        };

        match &outcome {
            FolderOutcome::Uploaded { .. } => {
                println!("\n{}", output::rule());
                println!("SUCCESS!");
                println!("{}", output::rule());
            }
            FolderOutcome::Incomplete(_) => {
                println!("\nUpload incomplete for {}", folder_name);
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// Step 1: write ID3 metadata. Problems are reported, never fatal.
    fn step_tag(&self, folder: &Path, dry_run: bool) {
        println!("\n[STEP 1] Editing metadata...");

        if dry_run {
            println!("  [DRY RUN] Would tag metadata");
            return;
        }

        let defaults = TagDefaults::from(&self.config.defaults);
        match self.tagger.tag_folder(folder, &defaults) {
            Ok(summary) => {
                println!("  Tagged {} file(s), skipped {}", summary.tagged, summary.skipped);
                if summary.tagged == 0 {
                    println!("  Warning: Metadata step had issues");
                }
            }
            Err(e) => {
                println!("  Warning: Metadata step had issues: {:#}", e);
                tracing::warn!("Tagging {} failed: {:#}", folder.display(), e);
            }
        }
    }

    /// Step 2: upload to archive.org
    async fn step_upload(
        &self,
        folder: &Path,
        folder_name: &str,
        options: &ProcessOptions,
    ) -> Result<FolderOutcome> {
        println!("\n[STEP 2] Uploading to archive.org...");

        let defaults = &self.config.defaults;
        let identifier = generate_identifier(folder_name);
        let url = item_url(&self.config.archive.details_url, &identifier);

        if self.history.contains(&identifier)? {
            println!("  [SKIP] Already in upload history: {}", identifier);
            return Ok(FolderOutcome::Skipped {
                identifier,
                reason: "already in upload history".to_string(),
            });
        }

        let files = list_audio_files(folder)?;
        if files.is_empty() {
            anyhow::bail!("No audio files found in {}", folder.display());
        }

        // Dry runs only read state; real runs hold the lock from here on
        let _lock = if options.dry_run {
            None
        } else {
            self.config.credentials()?;
            Some(self.checkpoints.lock(&identifier)?)
        };

        // Any checkpoint record means our own earlier run may have created
        // the item, so its remote existence says nothing about completeness
        if !self.checkpoints.exists(&identifier)? && self.archive.item_exists(&identifier).await? {
            println!("  [SKIP] Already exists on archive.org: {}", identifier);
            if !options.dry_run {
                self.history
                    .add(&identifier, UploadHistoryRecord::new(folder_name, url, files.len()))?;
            }
            return Ok(FolderOutcome::Skipped {
                identifier,
                reason: "already exists on archive.org".to_string(),
            });
        }

        let request = UploadRequest {
            folder: folder.to_path_buf(),
            identifier: identifier.clone(),
            metadata: ItemMetadata::for_folder(
                folder_name,
                &defaults.artist,
                &defaults.base_tags,
                &self.upload_options.collection,
                Some(&defaults.language),
            ),
            files,
        };

        let mut upload_options = self.upload_options.clone();
        upload_options.generate_cover &= !options.skip_thumbnail;
        let generate_cover = upload_options.generate_cover;

        let checkpoints: Arc<dyn CheckpointStore> = self.checkpoints.clone();
        let driver = UploadDriver::new(self.archive.clone(), checkpoints, upload_options);

        if options.dry_run {
            self.preview(&driver, &request, generate_cover)?;
            return Ok(FolderOutcome::Previewed);
        }

        // Keeps the rendered cover alive until the run is over
        let cover_dir = TempDir::new().context("Failed to create temporary directory")?;
        let progress = self.progress_bar();
        let driver = driver
            .with_cover(Arc::new(FfmpegCoverGenerator::new(cover_dir.path())))
            .with_progress(progress.clone());

        println!("  Identifier: {}", identifier);
        let total_bytes: u64 = request
            .files
            .iter()
            .filter_map(|path| fs_err::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();
        println!(
            "  Files: {} ({})",
            request.files.len(),
            format_file_size(total_bytes)
        );

        let report = driver.run(&request).await?;
        progress.finish_and_clear();
        output::print_upload_report(&report);

        if !report.is_success() {
            return Ok(FolderOutcome::Incomplete(report));
        }

        self.history.add(
            &identifier,
            UploadHistoryRecord::new(folder_name, url.clone(), request.files.len()),
        )?;
        println!("  URL: {}", url);

        Ok(FolderOutcome::Uploaded {
            report,
            moved_to: None,
        })
    }

    /// Step 3: move the folder out of the input area
    fn step_move(&self, folder: &Path) -> Option<PathBuf> {
        println!("\n[STEP 3] Moving to done folder...");

        match move_to_done(folder, &self.upload_options.done_folder) {
            Ok(destination) => {
                println!("  Moved to: {}", destination.display());
                Some(destination)
            }
            Err(e) => {
                println!("  Warning: {}", e);
                tracing::warn!("{}", e);
                None
            }
        }
    }

    fn preview(&self, driver: &UploadDriver, request: &UploadRequest, generate_cover: bool) -> Result<()> {
        let pending = driver.plan(request)?;

        println!("  [DRY RUN] Identifier: {}", request.identifier);
        println!("  [DRY RUN] Title: {}", request.metadata.title);
        println!("  [DRY RUN] Collection: {}", request.metadata.collection);
        println!("  [DRY RUN] Tags: {}", request.metadata.subjects.join("; "));
        if generate_cover {
            println!("  [DRY RUN] Would generate cover {}", COVER_FILE_NAME);
        }
        println!(
            "  [DRY RUN] Would upload {} of {} file(s):",
            pending.len(),
            request.files.len()
        );
        for name in file_names(&pending) {
            println!("    - {}", name);
        }
        println!(
            "  [DRY RUN] Would move to: {}",
            self.upload_options.done_folder.join(folder_name(&request.folder)?).display()
        );

        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress
    }
}

fn folder_name(folder: &Path) -> Result<String> {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive a name from {}", folder.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MockArchiveClient, TransferResponse};
    use crate::tagging::TagSummary;
    use crate::utils::file_name_of;
    use crate::ArchiverError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTagger(Arc<AtomicUsize>);

    impl AudioTagger for CountingTagger {
        fn tag_folder(&self, _folder: &Path, _defaults: &TagDefaults) -> Result<TagSummary> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TagSummary { tagged: 1, skipped: 0 })
        }
    }

    struct Fixture {
        _temp: TempDir,
        config: Config,
        folder: PathBuf,
        tag_calls: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.folders.input = temp.path().join("audio_folders");
        config.folders.done = temp.path().join("done");
        config.folders.state = temp.path().join("state");
        config.archive.access_key = Some("access".to_string());
        config.archive.secret_key = Some("secret".to_string());
        config.upload.generate_cover = false;

        let folder = config.folders.input.join("21_Kitab ul Taharat");
        fs_err::create_dir_all(&folder).unwrap();
        for name in ["01.mp3", "02.mp3"] {
            fs_err::write(folder.join(name), b"audio").unwrap();
        }

        Fixture {
            _temp: temp,
            config,
            folder,
            tag_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn pipeline(fx: &Fixture, archive: MockArchiveClient) -> FolderPipeline {
        FolderPipeline::with_parts(
            fx.config.clone(),
            Arc::new(archive),
            Box::new(CountingTagger(fx.tag_calls.clone())),
            true,
        )
    }

    fn accepting_archive() -> MockArchiveClient {
        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().returning(|_| Ok(false));
        archive.expect_upload().returning(|_, files, _| {
            Ok(vec![TransferResponse::ok(file_name_of(&files[0]).unwrap())])
        });
        archive
    }

    #[tokio::test]
    async fn test_full_run_records_history_and_moves_folder() {
        let fx = fixture();
        let pipeline = pipeline(&fx, accepting_archive());

        let outcome = pipeline
            .process_folder(&fx.folder, &ProcessOptions::default())
            .await
            .unwrap();

        match outcome {
            FolderOutcome::Uploaded { report, moved_to } => {
                assert_eq!(report.uploaded.len(), 2);
                assert_eq!(moved_to, Some(fx.config.folders.done.join("21_Kitab ul Taharat")));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let history = HistoryStore::new(fx.config.history_path()).load().unwrap();
        let record = &history["21-kitab-ul-taharat"];
        assert_eq!(record.files, 2);
        assert_eq!(record.url, "https://archive.org/details/21-kitab-ul-taharat");
        assert_eq!(fx.tag_calls.load(Ordering::SeqCst), 1);
        assert!(!FileCheckpointStore::new(fx.config.checkpoint_dir())
            .path_for("21-kitab-ul-taharat")
            .exists());
    }

    #[tokio::test]
    async fn test_tag_only_makes_no_remote_calls() {
        let fx = fixture();
        let pipeline = pipeline(&fx, MockArchiveClient::new());

        let options = ProcessOptions {
            tag_only: true,
            ..Default::default()
        };
        let outcome = pipeline.process_folder(&fx.folder, &options).await.unwrap();

        assert!(matches!(outcome, FolderOutcome::Tagged));
        assert_eq!(fx.tag_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let fx = fixture();
        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().returning(|_| Ok(false));
        archive.expect_upload().never();
        let pipeline = pipeline(&fx, archive);

        let options = ProcessOptions {
            dry_run: true,
            ..Default::default()
        };
        let outcome = pipeline.process_folder(&fx.folder, &options).await.unwrap();

        assert!(matches!(outcome, FolderOutcome::Previewed));
        assert!(fx.folder.exists());
        assert_eq!(fx.tag_calls.load(Ordering::SeqCst), 0);
        assert!(!fx.config.history_path().exists());
    }

    #[tokio::test]
    async fn test_history_entry_skips_upload() {
        let fx = fixture();
        HistoryStore::new(fx.config.history_path())
            .add("21-kitab-ul-taharat", UploadHistoryRecord::new("21_Kitab ul Taharat", "u", 2))
            .unwrap();

        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().never();
        archive.expect_upload().never();
        let pipeline = pipeline(&fx, archive);

        let options = ProcessOptions {
            upload_only: true,
            ..Default::default()
        };
        let outcome = pipeline.process_folder(&fx.folder, &options).await.unwrap();

        assert!(matches!(outcome, FolderOutcome::Skipped { .. }));
        assert!(!outcome.is_success());
        assert!(fx.folder.exists());
    }

    #[tokio::test]
    async fn test_existing_remote_item_is_recorded_not_uploaded() {
        let fx = fixture();
        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().returning(|_| Ok(true));
        archive.expect_upload().never();
        let pipeline = pipeline(&fx, archive);

        let outcome = pipeline
            .process_folder(&fx.folder, &ProcessOptions::default())
            .await
            .unwrap();

        assert!(matches!(outcome, FolderOutcome::Skipped { .. }));
        let history = HistoryStore::new(fx.config.history_path()).load().unwrap();
        assert_eq!(history["21-kitab-ul-taharat"].files, 2);
    }

    #[tokio::test]
    async fn test_partial_checkpoint_resumes_without_existence_check() {
        let fx = fixture();
        let store = FileCheckpointStore::new(fx.config.checkpoint_dir());
        let mut seeded = crate::checkpoint::UploadCheckpoint::default();
        seeded.mark_uploaded("01.mp3");
        store.save("21-kitab-ul-taharat", &seeded).unwrap();

        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().never();
        archive
            .expect_upload()
            .times(1)
            .withf(|_, files, metadata| {
                file_name_of(&files[0]).as_deref() == Some("02.mp3") && metadata.is_none()
            })
            .returning(|_, _, _| Ok(vec![TransferResponse::ok("02.mp3")]));
        let pipeline = pipeline(&fx, archive);

        let options = ProcessOptions {
            upload_only: true,
            ..Default::default()
        };
        let outcome = pipeline.process_folder(&fx.folder, &options).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_failed_only_checkpoint_retries_instead_of_skipping() {
        let fx = fixture();
        let store = FileCheckpointStore::new(fx.config.checkpoint_dir());
        let mut seeded = crate::checkpoint::UploadCheckpoint::default();
        seeded.mark_failed("01.mp3");
        store.save("21-kitab-ul-taharat", &seeded).unwrap();

        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().never();
        archive
            .expect_upload()
            .times(2)
            .returning(|_, files, _| Ok(vec![TransferResponse::ok(file_name_of(&files[0]).unwrap())]));
        let pipeline = pipeline(&fx, archive);

        let options = ProcessOptions {
            upload_only: true,
            ..Default::default()
        };
        let outcome = pipeline.process_folder(&fx.folder, &options).await.unwrap();

        match outcome {
            FolderOutcome::Uploaded { report, .. } => {
                assert_eq!(report.uploaded, vec!["01.mp3", "02.mp3"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!store.exists("21-kitab-ul-taharat").unwrap());
        let history = HistoryStore::new(fx.config.history_path()).load().unwrap();
        assert_eq!(history["21-kitab-ul-taharat"].files, 2);
    }

    #[tokio::test]
    async fn test_lock_is_taken_before_checkpoint_is_read() {
        let fx = fixture();
        let store = FileCheckpointStore::new(fx.config.checkpoint_dir());
        let _held = store.lock("21-kitab-ul-taharat").unwrap();
        fs_err::write(store.path_for("21-kitab-ul-taharat"), "{ not json").unwrap();

        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().never();
        archive.expect_upload().never();
        let pipeline = pipeline(&fx, archive);

        let options = ProcessOptions {
            upload_only: true,
            ..Default::default()
        };
        let err = pipeline.process_folder(&fx.folder, &options).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ArchiverError>(),
            Some(ArchiverError::CheckpointLocked(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_options_set_collection_and_move() {
        let mut fx = fixture();
        fx.config.defaults.collection = "community_audio".to_string();
        fx.config.upload.auto_move = false;

        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().returning(|_| Ok(false));
        archive
            .expect_upload()
            .withf(|_, _, metadata| {
                metadata
                    .as_ref()
                    .map_or(true, |m| m.collection == "community_audio")
            })
            .returning(|_, files, _| Ok(vec![TransferResponse::ok(file_name_of(&files[0]).unwrap())]));
        let pipeline = pipeline(&fx, archive);

        let outcome = pipeline
            .process_folder(&fx.folder, &ProcessOptions::default())
            .await
            .unwrap();

        match outcome {
            FolderOutcome::Uploaded { moved_to, .. } => assert_eq!(moved_to, None),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(fx.folder.exists());
    }

    #[tokio::test]
    async fn test_rejection_leaves_folder_in_place() {
        let fx = fixture();
        let mut archive = MockArchiveClient::new();
        archive.expect_item_exists().returning(|_| Ok(false));
        archive.expect_upload().returning(|_, files, _| {
            let name = file_name_of(&files[0]).unwrap();
            if name == "02.mp3" {
                Ok(vec![TransferResponse::rejected(name, 403, "forbidden")])
            } else {
                Ok(vec![TransferResponse::ok(name)])
            }
        });
        let pipeline = pipeline(&fx, archive);

        let outcome = pipeline
            .process_folder(&fx.folder, &ProcessOptions::default())
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert!(fx.folder.exists());
        assert!(!fx.config.history_path().exists());
        assert!(FileCheckpointStore::new(fx.config.checkpoint_dir())
            .path_for("21-kitab-ul-taharat")
            .exists());
    }

    #[tokio::test]
    async fn test_invalid_folder_is_rejected() {
        let fx = fixture();
        let pipeline = pipeline(&fx, MockArchiveClient::new());

        let err = pipeline
            .process_folder(&fx.folder.join("missing"), &ProcessOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ArchiverError>(),
            Some(ArchiverError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_process_all_counts_successes() {
        let fx = fixture();
        fs_err::create_dir_all(fx.config.folders.input.join("22_Empty")).unwrap();
        let pipeline = pipeline(&fx, accepting_archive());

        let (succeeded, total) = pipeline
            .process_all(&ProcessOptions {
                upload_only: true,
                ..Default::default()
            })
            .await
            .unwrap();

        // The empty folder has no audio files and fails
        assert_eq!((succeeded, total), (1, 2));
    }
}
