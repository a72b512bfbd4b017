use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One completed upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadHistoryRecord {
    /// Folder name the item was uploaded from
    pub folder: String,

    /// When the upload completed
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub uploaded: DateTime<Local>,

    /// Public item page
    pub url: String,

    /// Number of audio files in the item
    pub files: usize,

    /// Set by `sync`: whether the item was found on archive.org
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_files: Option<usize>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub synced_at: Option<DateTime<Local>>,
}

impl UploadHistoryRecord {
    pub fn new(folder: impl Into<String>, url: impl Into<String>, files: usize) -> Self {
        Self {
            folder: folder.into(),
            uploaded: Local::now(),
            url: url.into(),
            files,
            verified: None,
            remote_title: None,
            remote_files: None,
            synced_at: None,
        }
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 one in local time
/// (older history files were written without an offset).
fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local.from_local_datetime(&naive).earliest()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_timestamp(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", value)))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", value))),
        None => Ok(None),
    }
}

/// Upload history keyed by identifier
pub type UploadHistory = BTreeMap<String, UploadHistoryRecord>;

/// JSON file holding the [`UploadHistory`]
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<UploadHistory> {
        if !self.path.exists() {
            return Ok(UploadHistory::new());
        }

        let content = fs_err::read_to_string(&self.path).context("Failed to read upload history")?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse upload history {}", self.path.display()))
    }

    pub fn save(&self, history: &UploadHistory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content =
            serde_json::to_string_pretty(history).context("Failed to serialize upload history")?;
        fs_err::write(&self.path, content).context("Failed to write upload history")?;
        Ok(())
    }

    /// Insert or replace the record for `identifier`
    pub fn add(&self, identifier: &str, record: UploadHistoryRecord) -> Result<()> {
        let mut history = self.load()?;
        history.insert(identifier.to_string(), record);
        self.save(&history)
    }

    pub fn contains(&self, identifier: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_history_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("upload_history.json"));

        assert!(store.load().unwrap().is_empty());
        assert!(!store.contains("item").unwrap());
    }

    #[test]
    fn test_add_and_reload() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("state").join("upload_history.json"));

        store
            .add(
                "21-kitab",
                UploadHistoryRecord::new("21_Kitab", "https://archive.org/details/21-kitab", 12),
            )
            .unwrap();

        let history = store.load().unwrap();
        let record = &history["21-kitab"];
        assert_eq!(record.folder, "21_Kitab");
        assert_eq!(record.files, 12);
        assert_eq!(record.verified, None);
        assert!(store.contains("21-kitab").unwrap());
    }

    #[test]
    fn test_unsynced_record_omits_verification_fields() {
        let record = UploadHistoryRecord::new("f", "u", 1);
        let value = serde_json::to_value(&record).unwrap();

        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["files", "folder", "uploaded", "url"]);
    }

    #[test]
    fn test_reads_externally_synced_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upload_history.json");
        fs_err::write(
            &path,
            r#"{
              "item": {
                "folder": "01_Intro",
                "uploaded": "2025-01-05T10:00:00+05:00",
                "url": "https://archive.org/details/item",
                "files": 3,
                "verified": true,
                "remote_title": "01 - Intro",
                "remote_files": 3
              }
            }"#,
        )
        .unwrap();

        let history = HistoryStore::new(&path).load().unwrap();
        assert_eq!(history["item"].verified, Some(true));
        assert_eq!(history["item"].remote_files, Some(3));
        assert_eq!(history["item"].synced_at, None);
    }

    #[test]
    fn test_reads_timestamps_without_offset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upload_history.json");
        fs_err::write(
            &path,
            r#"{
              "item": {
                "folder": "01_Intro",
                "uploaded": "2025-01-05T10:00:00.123456",
                "url": "https://archive.org/details/item",
                "files": 3,
                "synced_at": "2025-02-01T08:30:00"
              }
            }"#,
        )
        .unwrap();

        let store = HistoryStore::new(&path);
        let history = store.load().unwrap();
        let record = &history["item"];
        assert_eq!(
            record.uploaded.naive_local(),
            NaiveDateTime::parse_from_str("2025-01-05T10:00:00.123456", "%Y-%m-%dT%H:%M:%S%.f")
                .unwrap()
        );
        assert!(record.synced_at.is_some());
        assert!(store.contains("item").unwrap());

        // Rewritten with an offset, and still readable afterwards
        store.save(&history).unwrap();
        assert_eq!(store.load().unwrap()["item"].uploaded, record.uploaded);
    }

    #[test]
    fn test_rejects_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2025-01-05T10:00:00+05:00").is_some());
        assert!(parse_timestamp("2025-01-05 10:00:00").is_some());
    }
}
