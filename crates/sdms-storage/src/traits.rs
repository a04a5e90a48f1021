//! Storage abstraction trait
//!
//! This module defines the capability contract every provider-specific
//! partition implements. The connection pool and the facade only depend on it.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::client::ProviderError;
use crate::location::StorageLocation;
use crate::options::{DownloadUrlOptions, SasTokenOptions, UploadUrlOptions, WriteOptions, WriteResult};
use crate::partition::ResolvedContainer;

/// Byte stream handed to streamed writes.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found reading file '{0}'")]
    NotFound(String),

    #[error("Blob already exists: {0}")]
    AlreadyExists(String),

    #[error("location type '{0}' is not handled")]
    UnresolvedLocationType(String),

    #[error("Failed to create container '{container}': {source}")]
    ContainerCreation {
        container: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("SAS signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// One implementation exists per cloud provider. Locations are logical: the
/// implementation maps each [`crate::LocationType`] to a container on one of
/// the partition's accounts.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if a blob exists at the location
    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool>;

    /// Stream a blob to the location
    ///
    /// A known `content_length` selects a single-shot upload, otherwise the
    /// stream is uploaded in chunks. Returns the content MD5 when the provider
    /// reports one.
    async fn write(
        &self,
        location: &StorageLocation,
        reader: BlobReader,
        options: Option<WriteOptions>,
    ) -> StorageResult<WriteResult>;

    /// Upload fixed-size content
    ///
    /// With `overwrite == false` the upload only happens when no blob exists
    /// yet; finding one is a successful no-op.
    async fn write_buffer(
        &self,
        location: &StorageLocation,
        data: Bytes,
        overwrite: bool,
    ) -> StorageResult<()>;

    /// Download the full content of a blob
    ///
    /// Fails with [`StorageError::NotFound`] naming the file when absent.
    async fn read_buffer(&self, location: &StorageLocation) -> StorageResult<Bytes>;

    /// Generate a SAS query string for the location's blob
    async fn generate_sas_token(
        &self,
        location: &StorageLocation,
        options: &SasTokenOptions,
    ) -> StorageResult<String>;

    /// Generate a signed upload URL
    async fn generate_upload_url(
        &self,
        location: &StorageLocation,
        options: &UploadUrlOptions,
    ) -> StorageResult<String>;

    /// Generate a signed download URL
    async fn generate_download_url(
        &self,
        location: &StorageLocation,
        options: &DownloadUrlOptions,
    ) -> StorageResult<String>;

    /// Ensure the location's container exists and return it
    async fn create_container(&self, location: &StorageLocation) -> StorageResult<ResolvedContainer>;
}
