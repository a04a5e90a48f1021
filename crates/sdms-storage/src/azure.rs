//! Azure Blob Storage provider
//!
//! Account clients over `azure_storage_blobs`. Authentication uses a bearer
//! token from `AZURE_STORAGE_TOKEN` when set, otherwise the default Azure
//! credential chain (environment, managed identity, Azure CLI). User delegation
//! keys require an Entra ID identity; shared keys cannot request them.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::request_options::IfMatchCondition;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{BlobServiceClient as AzureServiceClient, ContainerClient};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;

use crate::client::{
    BlobServiceClient, BlobServiceConnector, BlobUploadResponse, ProviderError, ProviderResult,
    UploadConditions, UserDelegationKey,
};
use crate::traits::{BlobReader, StorageError, StorageResult};

/// Translate an SDK failure into the provider diagnostic triple.
pub fn provider_error(err: azure_core::Error) -> ProviderError {
    let (status_code, error_code) = match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => (u16::from(*status), error_code.clone()),
        // No HTTP response: transport, credential or decoding failure.
        _ => (0, None),
    };
    ProviderError {
        request_id: None,
        status_code,
        error_code,
        message: err.to_string(),
    }
}

fn to_offset(at: DateTime<Utc>) -> ProviderResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| ProviderError::new(400, "InvalidInput", format!("invalid time {}: {}", at, e)))
}

fn to_chrono(at: OffsetDateTime) -> ProviderResult<DateTime<Utc>> {
    DateTime::from_timestamp(at.unix_timestamp(), at.nanosecond()).ok_or_else(|| {
        ProviderError::new(500, "InvalidResponse", format!("time out of range: {}", at))
    })
}

/// Blob service client for one storage account.
pub struct AzureBlobService {
    account_name: String,
    service: AzureServiceClient,
}

impl AzureBlobService {
    pub fn new(account_name: impl Into<String>, credentials: StorageCredentials) -> Self {
        let account_name = account_name.into();
        let service = AzureServiceClient::new(account_name.clone(), credentials);
        Self {
            account_name,
            service,
        }
    }

    fn container(&self, container: &str) -> ContainerClient {
        self.service.container_client(container)
    }

    async fn put(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        conditions: &UploadConditions,
    ) -> ProviderResult<BlobUploadResponse> {
        let start = Instant::now();
        let digest = md5::compute(&data);
        let size = data.len();

        let mut request = self.container(container).blob_client(blob).put_block_blob(data);
        if let Some(etag) = conditions.if_none_match.clone() {
            request = request.if_match(IfMatchCondition::NotMatch(etag));
        }
        request.await.map_err(provider_error)?;

        tracing::debug!(
            account = %self.account_name,
            container = %container,
            blob = %blob,
            size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Put block blob"
        );

        Ok(BlobUploadResponse {
            content_md5: Some(digest.0.to_vec()),
            request_id: None,
        })
    }

    async fn drain(reader: BlobReader) -> ProviderResult<Vec<u8>> {
        let mut reader = reader;
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| ProviderError::new(400, "InvalidInput", format!("read failed: {}", e)))?;
        Ok(buffer)
    }
}

#[async_trait]
impl BlobServiceClient for AzureBlobService {
    fn account_name(&self) -> &str {
        &self.account_name
    }

    async fn get_user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> ProviderResult<UserDelegationKey> {
        let response = self
            .service
            .get_user_deligation_key(to_offset(starts_on)?, to_offset(expires_on)?)
            .await
            .map_err(provider_error)?;
        let key = response.user_deligation_key;

        Ok(UserDelegationKey {
            signed_object_id: key.signed_oid.to_string(),
            signed_tenant_id: key.signed_tid.to_string(),
            signed_starts_on: to_chrono(key.signed_start)?,
            signed_expires_on: to_chrono(key.signed_expiry)?,
            signed_service: key.signed_service,
            signed_version: key.signed_version,
            value: key.value.secret().to_string(),
        })
    }

    async fn container_exists(&self, container: &str) -> ProviderResult<bool> {
        self.container(container).exists().await.map_err(provider_error)
    }

    async fn create_container(&self, container: &str) -> ProviderResult<()> {
        self.container(container).create().await.map_err(provider_error)
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        conditions: UploadConditions,
    ) -> ProviderResult<BlobUploadResponse> {
        self.put(container, blob, data, &conditions).await
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        reader: BlobReader,
        content_length: u64,
    ) -> ProviderResult<BlobUploadResponse> {
        let data = Self::drain(reader).await?;
        if data.len() as u64 != content_length {
            return Err(ProviderError::new(
                400,
                "InvalidHeaderValue",
                format!(
                    "Content-Length {} does not match {} bytes read",
                    content_length,
                    data.len()
                ),
            ));
        }
        self.put(container, blob, Bytes::from(data), &UploadConditions::default())
            .await
    }

    async fn upload_stream(
        &self,
        container: &str,
        blob: &str,
        reader: BlobReader,
    ) -> ProviderResult<BlobUploadResponse> {
        let data = Self::drain(reader).await?;
        self.put(container, blob, Bytes::from(data), &UploadConditions::default())
            .await
    }

    async fn download(&self, container: &str, blob: &str) -> ProviderResult<Bytes> {
        let content = self
            .container(container)
            .blob_client(blob)
            .get_content()
            .await
            .map_err(provider_error)?;
        Ok(Bytes::from(content))
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> ProviderResult<bool> {
        self.container(container)
            .blob_client(blob)
            .exists()
            .await
            .map_err(provider_error)
    }
}

/// Builds [`AzureBlobService`] clients sharing one credential.
#[derive(Clone)]
pub struct AzureConnector {
    credentials: StorageCredentials,
}

impl AzureConnector {
    pub fn new(credentials: StorageCredentials) -> Self {
        Self { credentials }
    }

    /// Credentials from `AZURE_STORAGE_TOKEN`, falling back to the default
    /// Azure credential chain.
    pub fn from_env() -> StorageResult<Self> {
        let credentials = match std::env::var("AZURE_STORAGE_TOKEN") {
            Ok(token) if !token.trim().is_empty() => StorageCredentials::bearer_token(token),
            _ => {
                let credential = azure_identity::create_credential().map_err(|e| {
                    StorageError::Configuration(format!("Azure credential unavailable: {}", e))
                })?;
                StorageCredentials::token_credential(credential)
            }
        };
        Ok(Self::new(credentials))
    }
}

impl BlobServiceConnector for AzureConnector {
    fn connect(&self, account_name: &str) -> Arc<dyn BlobServiceClient> {
        tracing::debug!(account = %account_name, "Connecting Azure blob service client");
        Arc::new(AzureBlobService::new(account_name, self.credentials.clone()))
    }
}
