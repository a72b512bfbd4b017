use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ArchiverError;

/// Environment variables that override the configured archive credentials
pub const ACCESS_KEY_ENV: &str = "IA_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "IA_SECRET_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Item and tag defaults
    pub defaults: DefaultsConfig,

    /// Working folders
    pub folders: FoldersConfig,

    /// archive.org connection settings
    pub archive: ArchiveConfig,

    /// Upload behaviour
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub language: String,

    /// archive.org collection new items are created in
    pub collection: String,

    /// Semicolon separated subject tags attached to every item
    pub base_tags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldersConfig {
    /// Root scanned by `process --all`
    pub input: PathBuf,

    /// Destination root for fully uploaded folders
    pub done: PathBuf,

    /// Checkpoints, upload history and exported archive data
    pub state: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// IA-S3 upload endpoint
    pub s3_endpoint: String,

    /// Item metadata read API
    pub metadata_endpoint: String,

    /// Advanced search API
    pub search_endpoint: String,

    /// Public item page prefix
    pub details_url: String,

    pub access_key: Option<String>,
    pub secret_key: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Move the folder to `folders.done` after a complete upload
    pub auto_move: bool,

    /// Upload a generated cover image ahead of the audio files
    pub generate_cover: bool,
}

/// Options handed to the upload pipeline at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub collection: String,
    pub auto_move: bool,
    pub generate_cover: bool,
    pub done_folder: PathBuf,
}

/// Resolved archive.org credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig {
                artist: "Sheikh Mohammad Mohsin".to_string(),
                album: "Al Fiqh ul Ahwat Lecture Series".to_string(),
                genre: "Islamic Jurisprudence".to_string(),
                language: "Urdu".to_string(),
                collection: "opensource_audio".to_string(),
                base_tags: "Islamic Lecture; Fiqh; Urdu".to_string(),
            },
            folders: FoldersConfig {
                input: PathBuf::from("audio_folders"),
                done: PathBuf::from("audio-uploaded-done"),
                state: PathBuf::from(".lecture-archiver"),
            },
            archive: ArchiveConfig {
                s3_endpoint: "https://s3.us.archive.org".to_string(),
                metadata_endpoint: "https://archive.org/metadata".to_string(),
                search_endpoint: "https://archive.org/advancedsearch.php".to_string(),
                details_url: "https://archive.org/details".to_string(),
                access_key: None,
                secret_key: None,
                timeout_secs: 600,
            },
            upload: UploadConfig {
                auto_move: true,
                generate_cover: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit_path)?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Read and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit_path {
            return Ok(path.to_path_buf());
        }

        // Current directory wins so a project folder can carry its own settings
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("lecture-archiver").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("archive.s3_endpoint", &self.archive.s3_endpoint),
            ("archive.metadata_endpoint", &self.archive.metadata_endpoint),
            ("archive.search_endpoint", &self.archive.search_endpoint),
            ("archive.details_url", &self.archive.details_url),
        ] {
            crate::utils::validate_and_normalize_url(endpoint)
                .with_context(|| format!("Invalid {}", name))?;
        }

        if self.defaults.collection.trim().is_empty() {
            anyhow::bail!("defaults.collection must be configured");
        }

        Ok(())
    }

    /// Options for the upload driver and mover
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            collection: self.defaults.collection.clone(),
            auto_move: self.upload.auto_move,
            generate_cover: self.upload.generate_cover,
            done_folder: self.folders.done.clone(),
        }
    }

    /// Directory holding one checkpoint file per identifier
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.folders.state.join("checkpoints")
    }

    pub fn history_path(&self) -> PathBuf {
        self.folders.state.join("upload_history.json")
    }

    pub fn archive_items_path(&self) -> PathBuf {
        self.folders.state.join("archive_items.json")
    }

    /// Credentials from the environment, falling back to the config file
    pub fn credentials(&self) -> std::result::Result<Credentials, ArchiverError> {
        let access_key = std::env::var(ACCESS_KEY_ENV)
            .ok()
            .or_else(|| self.archive.access_key.clone())
            .filter(|key| !key.is_empty());
        let secret_key = std::env::var(SECRET_KEY_ENV)
            .ok()
            .or_else(|| self.archive.secret_key.clone())
            .filter(|key| !key.is_empty());

        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Ok(Credentials {
                access_key,
                secret_key,
            }),
            _ => Err(ArchiverError::Config(format!(
                "archive.org credentials missing: set {} and {} or archive.access_key/secret_key",
                ACCESS_KEY_ENV, SECRET_KEY_ENV
            ))),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Artist: {}", self.defaults.artist);
        println!("  Album: {}", self.defaults.album);
        println!("  Collection: {}", self.defaults.collection);
        println!("  Base Tags: {}", self.defaults.base_tags);
        println!("  Input Folder: {}", self.folders.input.display());
        println!("  Done Folder: {}", self.folders.done.display());
        println!("  State Folder: {}", self.folders.state.display());
        println!("  Upload Endpoint: {}", self.archive.s3_endpoint);
        println!(
            "  Credentials: {}",
            if self.credentials().is_ok() { "configured" } else { "missing" }
        );
        println!("  Auto Move: {}", self.upload.auto_move);
        println!("  Generate Cover: {}", self.upload.generate_cover);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_round_trips_through_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.yaml");

        let config = Config::default();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.defaults.collection, "opensource_audio");
        assert_eq!(loaded.folders.done, PathBuf::from("audio-uploaded-done"));
        assert!(loaded.upload.generate_cover);
    }

    #[test]
    fn test_upload_options_reflect_config() {
        let mut config = Config::default();
        config.upload.auto_move = false;
        config.folders.done = PathBuf::from("/srv/done");

        let options = config.upload_options();
        assert_eq!(
            options,
            UploadOptions {
                collection: "opensource_audio".to_string(),
                auto_move: false,
                generate_cover: true,
                done_folder: PathBuf::from("/srv/done"),
            }
        );
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");

        let mut config = Config::default();
        config.archive.s3_endpoint = "ftp://s3.us.archive.org".to_string();
        config.save_to(&path).unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_state_paths_live_under_state_folder() {
        let config = Config::default();
        assert_eq!(
            config.checkpoint_dir(),
            PathBuf::from(".lecture-archiver/checkpoints")
        );
        assert_eq!(
            config.history_path(),
            PathBuf::from(".lecture-archiver/upload_history.json")
        );
    }

    #[tokio::test]
    async fn test_load_writes_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");

        let config = Config::load(Some(&path)).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.defaults.language, "Urdu");
    }
}
