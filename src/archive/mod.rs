//! archive.org access: file transfer through the IA-S3 API, item lookups
//! through the metadata API, and creator search.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::config::{Config, Credentials};
use crate::library::AudioFormat;
use crate::metadata::{item_url, ItemMetadata};
use crate::utils::{file_name_of, join_url};
use crate::ArchiverError;

/// File formats archive.org reports for audio derivatives and originals
const AUDIO_FORMATS: &[&str] = &["VBR MP3", "MP3", "128Kbps MP3", "MPEG-4 Audio"];

/// Outcome of transferring one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub file: String,
    pub status: u16,
    pub message: Option<String>,
}

impl TransferResponse {
    pub fn ok(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status: 200,
            message: None,
        }
    }

    pub fn rejected(file: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// True when there is at least one response and every response succeeded
pub fn all_succeeded(responses: &[TransferResponse]) -> bool {
    !responses.is_empty() && responses.iter().all(TransferResponse::is_success)
}

/// A transfer that did not produce a response at all
#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive.org credentials are not configured")]
    MissingCredentials,
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Transport(err.to_string())
    }
}

/// A file stored in an archive item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: Option<u64>,
    pub format: String,
}

/// Remote view of an archive item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetails {
    pub identifier: String,
    pub exists: bool,
    pub title: String,
    pub creator: String,
    pub description: String,
    pub date: String,
    pub mediatype: String,
    pub collection: String,
    pub subject: String,
    pub files: Vec<RemoteFile>,
    pub file_count: usize,
    pub url: String,
    pub synced_at: DateTime<Local>,
}

/// Remote archive operations used by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Transfer `files` into the item `identifier`, one response per file.
    ///
    /// `metadata` creates or updates the item and is only sent with the
    /// first file. An `Err` means the transfer could not complete at all
    /// (network down, unreadable file); a rejected file is an `Ok` response
    /// with a non-success status.
    async fn upload(
        &self,
        identifier: &str,
        files: &[PathBuf],
        metadata: Option<ItemMetadata>,
    ) -> Result<Vec<TransferResponse>, TransferError>;

    /// Whether an item with this identifier exists
    async fn item_exists(&self, identifier: &str) -> Result<bool, ArchiverError>;

    /// Full item details, `None` if the item does not exist
    async fn item_details(&self, identifier: &str) -> Result<Option<ItemDetails>, ArchiverError>;

    /// Identifiers of all items by `creator`
    async fn search_by_creator(&self, creator: &str) -> Result<Vec<String>, ArchiverError>;
}

/// archive.org client
pub struct IaArchiveClient {
    client: Client,
    s3_endpoint: String,
    metadata_endpoint: String,
    search_endpoint: String,
    details_url: String,
    credentials: Option<Credentials>,
}

impl IaArchiveClient {
    /// Create a client from configuration. Credentials are optional so
    /// read-only commands work without them.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.archive.timeout_secs))
            .user_agent(concat!("lecture-archiver/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            s3_endpoint: config.archive.s3_endpoint.clone(),
            metadata_endpoint: config.archive.metadata_endpoint.clone(),
            search_endpoint: config.archive.search_endpoint.clone(),
            details_url: config.archive.details_url.clone(),
            credentials: config.credentials().ok(),
        })
    }

    async fn put_file(
        &self,
        credentials: &Credentials,
        identifier: &str,
        path: &Path,
        metadata: Option<&ItemMetadata>,
    ) -> Result<TransferResponse, TransferError> {
        let file_name = file_name_of(path).ok_or_else(|| TransferError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })?;

        let read_error = |source: std::io::Error| TransferError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(read_error)?;
        let size = file.metadata().await.map_err(read_error)?.len();

        let url = join_url(
            &self.s3_endpoint,
            &format!("{}/{}", identifier, urlencoding::encode(&file_name)),
        );

        tracing::debug!("PUT {} ({} bytes)", url, size);

        let mut request = self
            .client
            .put(&url)
            .header(
                "authorization",
                format!("LOW {}:{}", credentials.access_key, credentials.secret_key),
            )
            .header("content-type", content_type_for(path))
            .header("content-length", size)
            .header("x-archive-size-hint", size);

        if let Some(metadata) = metadata {
            for (name, value) in metadata_headers(metadata) {
                request = request.header(name, value);
            }
        }

        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = request.body(body).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(TransferResponse {
                file: file_name,
                status: status.as_u16(),
                message: None,
            })
        } else {
            let text = response.text().await.unwrap_or_default();
            Ok(TransferResponse::rejected(
                file_name,
                status.as_u16(),
                summarize_error_body(&text, status.canonical_reason()),
            ))
        }
    }

    async fn fetch_metadata(&self, identifier: &str) -> Result<Value, ArchiverError> {
        let url = join_url(&self.metadata_endpoint, identifier);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ArchiverError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ArchiverError::Remote(format!(
                "metadata lookup for {} returned HTTP {}",
                identifier,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ArchiverError::Remote(e.to_string()))
    }
}

#[async_trait]
impl ArchiveClient for IaArchiveClient {
    async fn upload(
        &self,
        identifier: &str,
        files: &[PathBuf],
        metadata: Option<ItemMetadata>,
    ) -> Result<Vec<TransferResponse>, TransferError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(TransferError::MissingCredentials)?;

        let mut responses = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            let item_metadata = if index == 0 { metadata.as_ref() } else { None };
            responses.push(
                self.put_file(credentials, identifier, path, item_metadata)
                    .await?,
            );
        }

        Ok(responses)
    }

    async fn item_exists(&self, identifier: &str) -> Result<bool, ArchiverError> {
        let value = self.fetch_metadata(identifier).await?;
        Ok(item_present(&value))
    }

    async fn item_details(&self, identifier: &str) -> Result<Option<ItemDetails>, ArchiverError> {
        let value = self.fetch_metadata(identifier).await?;
        Ok(parse_item_details(identifier, &value, &self.details_url))
    }

    async fn search_by_creator(&self, creator: &str) -> Result<Vec<String>, ArchiverError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            response: SearchDocs,
        }

        #[derive(Deserialize)]
        struct SearchDocs {
            docs: Vec<SearchDoc>,
        }

        #[derive(Deserialize)]
        struct SearchDoc {
            identifier: String,
        }

        let query = format!("creator:\"{}\"", creator.replace('"', "\\\""));
        let response = self
            .client
            .get(&self.search_endpoint)
            .query(&[
                ("q", query.as_str()),
                ("fl[]", "identifier"),
                ("rows", "10000"),
                ("output", "json"),
            ])
            .send()
            .await
            .map_err(|e| ArchiverError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ArchiverError::Remote(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ArchiverError::Remote(e.to_string()))?;

        Ok(parsed
            .response
            .docs
            .into_iter()
            .map(|doc| doc.identifier)
            .collect())
    }
}

/// IA-S3 headers that create the item and set its metadata
pub fn metadata_headers(metadata: &ItemMetadata) -> Vec<(String, String)> {
    let mut headers = vec![
        ("x-amz-auto-make-bucket".to_string(), "1".to_string()),
        (
            "x-archive-meta-mediatype".to_string(),
            header_value(&metadata.mediatype),
        ),
        (
            "x-archive-meta-collection".to_string(),
            header_value(&metadata.collection),
        ),
        ("x-archive-meta-title".to_string(), header_value(&metadata.title)),
        (
            "x-archive-meta-creator".to_string(),
            header_value(&metadata.creator),
        ),
        (
            "x-archive-meta-description".to_string(),
            header_value(&metadata.description),
        ),
    ];

    if let Some(language) = &metadata.language {
        headers.push(("x-archive-meta-language".to_string(), header_value(language)));
    }

    // Repeated fields are numbered: meta01-subject, meta02-subject, ...
    for (index, subject) in metadata.subjects.iter().enumerate() {
        headers.push((
            format!("x-archive-meta{:02}-subject", index + 1),
            header_value(subject),
        ));
    }

    headers
}

/// HTTP headers only carry printable ASCII; anything else goes through
/// archive.org's `uri(...)` percent-encoding escape.
pub fn header_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    if let Some(format) = AudioFormat::from_path(path) {
        return format.mime_type();
    }

    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn summarize_error_body(body: &str, reason: Option<&str>) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return reason.unwrap_or("rejected").to_string();
    }
    trimmed.chars().take(200).collect()
}

/// The metadata API answers `{}` for identifiers that do not exist
pub fn item_present(value: &Value) -> bool {
    value
        .get("metadata")
        .and_then(Value::as_object)
        .map(|metadata| !metadata.is_empty())
        .unwrap_or(false)
}

/// Build [`ItemDetails`] from a metadata API response
pub fn parse_item_details(identifier: &str, value: &Value, details_url: &str) -> Option<ItemDetails> {
    if !item_present(value) {
        return None;
    }

    let metadata = &value["metadata"];
    let files: Vec<RemoteFile> = value
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|file| {
                    let format = file.get("format")?.as_str()?;
                    if !AUDIO_FORMATS.contains(&format) {
                        return None;
                    }
                    Some(RemoteFile {
                        name: file.get("name")?.as_str()?.to_string(),
                        size: file.get("size").and_then(parse_size),
                        format: format.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ItemDetails {
        identifier: identifier.to_string(),
        exists: true,
        title: text_field(metadata, "title"),
        creator: text_field(metadata, "creator"),
        description: text_field(metadata, "description"),
        date: text_field(metadata, "date"),
        mediatype: text_field(metadata, "mediatype"),
        collection: text_field(metadata, "collection"),
        subject: text_field(metadata, "subject"),
        file_count: files.len(),
        files,
        url: item_url(details_url, identifier),
        synced_at: Local::now(),
    })
}

/// Metadata fields are either a string or a list of strings
fn text_field(metadata: &Value, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    }
}

fn parse_size(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metadata() -> ItemMetadata {
        ItemMetadata {
            title: "21 - Kitab ul Taharat".to_string(),
            creator: "Sheikh Mohammad Mohsin".to_string(),
            description: "21 - Kitab ul Taharat\n\nAudio lectures.".to_string(),
            subjects: vec!["Fiqh".to_string(), "Urdu".to_string()],
            collection: "opensource_audio".to_string(),
            language: Some("Urdu".to_string()),
            mediatype: "audio".to_string(),
        }
    }

    #[test]
    fn test_response_success() {
        assert!(TransferResponse::ok("a.mp3").is_success());
        assert!(!TransferResponse::rejected("a.mp3", 403, "denied").is_success());
        assert!(all_succeeded(&[TransferResponse::ok("a"), TransferResponse::ok("b")]));
        assert!(!all_succeeded(&[
            TransferResponse::ok("a"),
            TransferResponse::rejected("b", 503, "slow down"),
        ]));
        assert!(!all_succeeded(&[]));
    }

    #[test]
    fn test_metadata_headers() {
        let headers = metadata_headers(&sample_metadata());
        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("x-amz-auto-make-bucket"), Some("1"));
        assert_eq!(get("x-archive-meta-collection"), Some("opensource_audio"));
        assert_eq!(get("x-archive-meta-title"), Some("21 - Kitab ul Taharat"));
        assert_eq!(get("x-archive-meta01-subject"), Some("Fiqh"));
        assert_eq!(get("x-archive-meta02-subject"), Some("Urdu"));
        assert_eq!(get("x-archive-meta-language"), Some("Urdu"));
        assert!(get("x-archive-meta-description").unwrap().starts_with("uri("));
    }

    #[test]
    fn test_header_value_encodes_non_ascii() {
        assert_eq!(header_value("Fiqh"), "Fiqh");
        assert_eq!(header_value("فقہ"), "uri(%D9%81%D9%82%DB%81)");
        assert_eq!(header_value("a\nb"), "uri(a%0Ab)");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("01.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("__ia_thumb.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("notes")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_unreadable_file_is_a_transfer_error() {
        let mut config = Config::default();
        config.archive.access_key = Some("access".to_string());
        config.archive.secret_key = Some("secret".to_string());
        let client = IaArchiveClient::from_config(&config).unwrap();

        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("01.mp3");
        let result = client.upload("item", &[missing.clone()], None).await;

        match result {
            Err(TransferError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_item_is_not_present() {
        assert!(!item_present(&json!({})));
        assert!(parse_item_details("x", &json!({}), "https://archive.org/details").is_none());
    }

    #[test]
    fn test_parse_item_details_filters_audio_files() {
        let value = json!({
            "metadata": {
                "identifier": "21-kitab",
                "title": "21 - Kitab",
                "creator": "Sheikh Mohammad Mohsin",
                "collection": ["opensource_audio", "community"],
                "subject": ["Fiqh", "Urdu"],
                "mediatype": "audio"
            },
            "files": [
                {"name": "01.mp3", "size": "1024", "format": "VBR MP3"},
                {"name": "02.m4a", "size": "2048", "format": "MPEG-4 Audio"},
                {"name": "__ia_thumb.jpg", "size": "100", "format": "Item Tile"},
                {"name": "21-kitab_meta.xml", "format": "Metadata"}
            ]
        });

        let details =
            parse_item_details("21-kitab", &value, "https://archive.org/details").unwrap();
        assert_eq!(details.title, "21 - Kitab");
        assert_eq!(details.collection, "opensource_audio; community");
        assert_eq!(details.subject, "Fiqh; Urdu");
        assert_eq!(details.description, "");
        assert_eq!(details.file_count, 2);
        assert_eq!(details.files[0].size, Some(1024));
        assert_eq!(details.url, "https://archive.org/details/21-kitab");
    }
}
