//! Options accepted by token, URL and write operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SAS token options
///
/// `start` is carried for callers but the token is valid immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SasTokenOptions {
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadUrlOptions {
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    /// Scope the signature to the container instead of the blob
    #[serde(default)]
    pub batch_upload: bool,
    #[serde(default)]
    pub start_resumable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownloadUrlOptions {
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    /// Scope the signature to the container instead of the blob
    #[serde(default)]
    pub batch_download: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteOptions {
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub resumable: bool,
    /// Known stream length, selects a single-shot upload
    #[serde(default)]
    pub content_length: Option<u64>,
}

impl WriteOptions {
    pub fn with_content_length(content_length: u64) -> Self {
        Self {
            content_length: Some(content_length),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteResult {
    /// Base64 content MD5 reported by the provider
    pub md5_hash: Option<String>,
}
