//! ID3 tagging of lecture files via `lofty`.

use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::Path;

use crate::config::DefaultsConfig;
use crate::library::list_audio_files;
use crate::metadata::derive_title;

/// Values written into every file of a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefaults {
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub language: String,
}

impl From<&DefaultsConfig> for TagDefaults {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            artist: defaults.artist.clone(),
            album: defaults.album.clone(),
            genre: defaults.genre.clone(),
            language: defaults.language.clone(),
        }
    }
}

/// Files tagged vs. files that could not be tagged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub tagged: usize,
    pub skipped: usize,
}

/// Writes metadata into the audio files of a folder
pub trait AudioTagger: Send + Sync {
    fn tag_folder(&self, folder: &Path, defaults: &TagDefaults) -> anyhow::Result<TagSummary>;
}

/// Tags files with lofty, using each file's primary tag format
#[derive(Debug, Default)]
pub struct LoftyTagger;

impl LoftyTagger {
    pub fn new() -> Self {
        Self
    }

    fn tag_file(&self, path: &Path, defaults: &TagDefaults) -> Result<(), LoftyError> {
        let mut tagged_file = Probe::open(path)?.read()?;

        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(tag) = tagged_file.primary_tag_mut() {
            tag.set_title(derive_title(&stem));
            tag.set_artist(defaults.artist.clone());
            tag.set_album(defaults.album.clone());
            tag.set_genre(defaults.genre.clone());
            tag.insert_text(ItemKey::Language, defaults.language.clone());
            if let Some(track) = track_number(&stem) {
                tag.set_track(track);
            }
        }

        tagged_file.save_to_path(path, WriteOptions::default())
    }
}

impl AudioTagger for LoftyTagger {
    fn tag_folder(&self, folder: &Path, defaults: &TagDefaults) -> anyhow::Result<TagSummary> {
        let mut summary = TagSummary::default();

        for path in list_audio_files(folder)? {
            match self.tag_file(&path, defaults) {
                Ok(()) => {
                    tracing::debug!("Tagged {}", path.display());
                    summary.tagged += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Leading digits of a file name, e.g. `07_Taharat` -> 7
pub fn track_number(stem: &str) -> Option<u32> {
    let digits: String = stem
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}
