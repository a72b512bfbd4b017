use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lecture-archiver",
    about = "Lecture Archiver - Tag audio lecture folders and upload them to archive.org",
    version,
    long_about = "A CLI tool that writes ID3 metadata into a folder of lecture recordings, generates a cover thumbnail, and uploads the folder to archive.org. Uploads are checkpointed per file, so re-running the same command resumes an interrupted upload."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "FILE", env = "LECTURE_ARCHIVER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tag and upload a lecture folder (or every pending folder with --all)
    Process {
        /// Folder containing the lecture audio files
        #[arg(value_name = "FOLDER", required_unless_present = "all")]
        folder: Option<PathBuf>,

        /// Process every folder in the configured input directory
        #[arg(long, conflicts_with = "folder")]
        all: bool,

        /// Only edit metadata, don't upload
        #[arg(long, conflicts_with = "upload_only")]
        tag_only: bool,

        /// Only upload, skip metadata
        #[arg(long)]
        upload_only: bool,

        /// Preview without making changes
        #[arg(long)]
        dry_run: bool,

        /// Skip thumbnail generation during upload
        #[arg(long)]
        skip_thumbnail: bool,
    },

    /// Show upload history
    History,

    /// Verify the local upload history against archive.org
    Sync {
        /// Show current upload status without contacting archive.org
        #[arg(long, conflicts_with_all = ["fetch_all", "export"])]
        status: bool,

        /// Fetch all items by creator from archive.org
        #[arg(long, conflicts_with = "export")]
        fetch_all: bool,

        /// Creator name for --fetch-all (defaults to the configured artist)
        #[arg(long, value_name = "NAME", requires = "fetch_all")]
        creator: Option<String>,

        /// Export full data for every history item to archive_items.json
        #[arg(long)]
        export: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
