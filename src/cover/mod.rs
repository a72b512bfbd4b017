use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::metadata::derive_title;

/// File name archive.org picks up as the item thumbnail
pub const COVER_FILE_NAME: &str = "__ia_thumb.jpg";

/// Produces a cover image for a lecture folder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoverGenerator: Send + Sync {
    /// Render the cover and return the path of the image
    async fn generate(&self, folder: &Path, creator: &str) -> Result<PathBuf>;
}

/// Renders a plain title card with ffmpeg's lavfi colour source
pub struct FfmpegCoverGenerator {
    output_dir: PathBuf,
    size: u32,
}

impl FfmpegCoverGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            size: 600,
        }
    }

    fn filter_graph(&self, title_file: &Path, creator_file: &Path) -> String {
        format!(
            "drawtext=textfile='{}':fontcolor=white:fontsize=40:x=(w-text_w)/2:y=(h-text_h)/2,\
             drawtext=textfile='{}':fontcolor=0xd8d8d8:fontsize=26:x=(w-text_w)/2:y=h-90",
            escape_filter_path(title_file),
            escape_filter_path(creator_file)
        )
    }
}

#[async_trait]
impl CoverGenerator for FfmpegCoverGenerator {
    async fn generate(&self, folder: &Path, creator: &str) -> Result<PathBuf> {
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Folder has no name")?;

        fs_err::create_dir_all(&self.output_dir)?;

        // drawtext reads the strings from files so no quoting rules apply to them
        let title_file = self.output_dir.join("cover_title.txt");
        let creator_file = self.output_dir.join("cover_creator.txt");
        fs_err::write(&title_file, derive_title(&folder_name))?;
        fs_err::write(&creator_file, creator)?;

        let output_path = self.output_dir.join(COVER_FILE_NAME);
        tracing::debug!("Rendering cover for {} -> {}", folder_name, output_path.display());

        let source = format!("color=c=0x1f3b4d:s={0}x{0}", self.size);
        let filters = self.filter_graph(&title_file, &creator_file);

        let output = Command::new("ffmpeg")
            .args(["-y", "-f", "lavfi", "-i", source.as_str(), "-vf", filters.as_str(), "-frames:v", "1"])
            .arg(&output_path)
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to render cover with ffmpeg: {}", error.trim());
        }

        Ok(output_path)
    }
}

/// Escape a path for use inside a single-quoted filtergraph option
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}
