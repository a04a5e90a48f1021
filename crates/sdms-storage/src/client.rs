//! Blob provider client port
//!
//! The storage layer never speaks the blob service's wire protocol itself. It
//! invokes a [`BlobServiceClient`] per storage account, and builds those clients
//! through a [`BlobServiceConnector`]. Provider failures surface as
//! [`ProviderError`], which keeps the request id, status code and provider error
//! code intact for diagnostics.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::traits::BlobReader;

/// DNS suffix of the blob endpoint of every storage account.
pub const BLOB_ENDPOINT_SUFFIX: &str = "blob.core.windows.net";

pub const BLOB_NOT_FOUND: &str = "BlobNotFound";
pub const BLOB_ALREADY_EXISTS: &str = "BlobAlreadyExists";
pub const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";
pub const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";

/// Failure reported by the blob provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{message} (requestId={}, statusCode={status_code}, errorCode={})",
    .request_id.as_deref().unwrap_or("-"),
    .error_code.as_deref().unwrap_or("-")
)]
pub struct ProviderError {
    pub request_id: Option<String>,
    pub status_code: u16,
    pub error_code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status_code: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            status_code,
            error_code: Some(error_code.into()),
            message: message.into(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn has_error_code(&self, code: &str) -> bool {
        self.error_code.as_deref() == Some(code)
    }

    pub fn is_blob_not_found(&self) -> bool {
        self.has_error_code(BLOB_NOT_FOUND)
    }

    pub fn is_blob_already_exists(&self) -> bool {
        self.has_error_code(BLOB_ALREADY_EXISTS)
    }

    pub fn is_container_already_exists(&self) -> bool {
        self.has_error_code(CONTAINER_ALREADY_EXISTS)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Short-lived credential issued by the provider and used to sign SAS tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct UserDelegationKey {
    pub signed_object_id: String,
    pub signed_tenant_id: String,
    pub signed_starts_on: DateTime<Utc>,
    pub signed_expires_on: DateTime<Utc>,
    pub signed_service: String,
    pub signed_version: String,
    /// Base64 encoded signing key.
    pub value: String,
}

impl fmt::Debug for UserDelegationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDelegationKey")
            .field("signed_object_id", &self.signed_object_id)
            .field("signed_tenant_id", &self.signed_tenant_id)
            .field("signed_starts_on", &self.signed_starts_on)
            .field("signed_expires_on", &self.signed_expires_on)
            .field("signed_service", &self.signed_service)
            .field("signed_version", &self.signed_version)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Access conditions for a block blob upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadConditions {
    pub if_none_match: Option<String>,
}

impl UploadConditions {
    /// Upload only when no blob exists at the target (`If-None-Match: *`).
    pub fn if_absent() -> Self {
        Self {
            if_none_match: Some("*".to_string()),
        }
    }

    pub fn requires_absent(&self) -> bool {
        self.if_none_match.as_deref() == Some("*")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobUploadResponse {
    pub content_md5: Option<Vec<u8>>,
    pub request_id: Option<String>,
}

/// Network client for one storage account.
///
/// Implementations must be cheap to share: a partition holds one per account
/// role and calls it concurrently.
#[async_trait]
pub trait BlobServiceClient: Send + Sync {
    fn account_name(&self) -> &str;

    /// Blob service endpoint of the account.
    fn url(&self) -> String {
        format!("https://{}.{}", self.account_name(), BLOB_ENDPOINT_SUFFIX)
    }

    async fn get_user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> ProviderResult<UserDelegationKey>;

    async fn container_exists(&self, container: &str) -> ProviderResult<bool>;

    async fn create_container(&self, container: &str) -> ProviderResult<()>;

    /// Upload a block blob in a single request.
    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        conditions: UploadConditions,
    ) -> ProviderResult<BlobUploadResponse>;

    /// Upload exactly `content_length` bytes read from `reader`.
    async fn upload(
        &self,
        container: &str,
        blob: &str,
        reader: BlobReader,
        content_length: u64,
    ) -> ProviderResult<BlobUploadResponse>;

    /// Upload a stream of unknown length in chunks.
    async fn upload_stream(
        &self,
        container: &str,
        blob: &str,
        reader: BlobReader,
    ) -> ProviderResult<BlobUploadResponse>;

    async fn download(&self, container: &str, blob: &str) -> ProviderResult<Bytes>;

    async fn blob_exists(&self, container: &str, blob: &str) -> ProviderResult<bool>;
}

/// Builds account clients for the connection pool.
///
/// `connect` must not perform network I/O; clients connect lazily on first use.
pub trait BlobServiceConnector: Send + Sync {
    fn connect(&self, account_name: &str) -> Arc<dyn BlobServiceClient>;
}
