//! In-memory blob provider
//!
//! Behaves like the real blob service where the storage layer can observe it:
//! conditional uploads, not-found downloads, content MD5 and delegation keys
//! covering the requested window. Call counters let tests assert how many
//! provider round trips an operation made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::client::{
    BlobServiceClient, BlobServiceConnector, BlobUploadResponse, ProviderError, ProviderResult,
    UploadConditions, UserDelegationKey, BLOB_ALREADY_EXISTS, BLOB_NOT_FOUND,
    CONTAINER_ALREADY_EXISTS, CONTAINER_NOT_FOUND,
};
use crate::traits::BlobReader;

fn container_not_found() -> ProviderError {
    ProviderError::new(404, CONTAINER_NOT_FOUND, "The specified container does not exist.")
}

/// Snapshot of the provider calls served so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryStats {
    pub delegation_key_requests: u64,
    /// Uploads that stored content, of any kind
    pub block_uploads: u64,
    /// Conditional uploads refused because the blob existed
    pub rejected_uploads: u64,
    pub containers_created: u64,
}

#[derive(Default)]
struct Counters {
    delegation_key_requests: AtomicU64,
    block_uploads: AtomicU64,
    rejected_uploads: AtomicU64,
    containers_created: AtomicU64,
}

/// Blob service for a single account, held entirely in memory.
pub struct InMemoryBlobService {
    account_name: String,
    containers: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    counters: Counters,
    create_container_fault: Mutex<Option<ProviderError>>,
}

impl InMemoryBlobService {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            containers: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            create_container_fault: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> InMemoryStats {
        InMemoryStats {
            delegation_key_requests: self.counters.delegation_key_requests.load(Ordering::SeqCst),
            block_uploads: self.counters.block_uploads.load(Ordering::SeqCst),
            rejected_uploads: self.counters.rejected_uploads.load(Ordering::SeqCst),
            containers_created: self.counters.containers_created.load(Ordering::SeqCst),
        }
    }

    /// Make the next `create_container` call fail with `error`.
    pub fn fail_next_create_container(&self, error: ProviderError) {
        *self
            .create_container_fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(error);
    }

    /// Stored content of a blob, bypassing the client API.
    pub async fn blob(&self, container: &str, blob: &str) -> Option<Bytes> {
        let containers = self.containers.read().await;
        containers.get(container)?.get(blob).cloned()
    }

    pub async fn container_names(&self) -> Vec<String> {
        let containers = self.containers.read().await;
        let mut names: Vec<String> = containers.keys().cloned().collect();
        names.sort();
        names
    }

    async fn store(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        conditions: &UploadConditions,
    ) -> ProviderResult<BlobUploadResponse> {
        let mut containers = self.containers.write().await;
        let blobs = containers.get_mut(container).ok_or_else(container_not_found)?;

        if conditions.requires_absent() && blobs.contains_key(blob) {
            self.counters.rejected_uploads.fetch_add(1, Ordering::SeqCst);
            return Err(ProviderError::new(
                409,
                BLOB_ALREADY_EXISTS,
                "The specified blob already exists.",
            ));
        }

        let digest = md5::compute(&data);
        blobs.insert(blob.to_string(), data);
        self.counters.block_uploads.fetch_add(1, Ordering::SeqCst);

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
impl BlobServiceClient for InMemoryBlobService {
    fn account_name(&self) -> &str {
        &self.account_name
    }

    async fn get_user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> ProviderResult<UserDelegationKey> {
        self.counters
            .delegation_key_requests
            .fetch_add(1, Ordering::SeqCst);

        let secret: [u8; 32] = rand::random();
        Ok(UserDelegationKey {
            signed_object_id: format!("{}-object", self.account_name),
            signed_tenant_id: format!("{}-tenant", self.account_name),
            signed_starts_on: starts_on,
            signed_expires_on: expires_on,
            signed_service: "b".to_string(),
            signed_version: crate::sas::SAS_VERSION.to_string(),
            value: BASE64_STANDARD.encode(secret),
        })
    }

    async fn container_exists(&self, container: &str) -> ProviderResult<bool> {
        Ok(self.containers.read().await.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> ProviderResult<()> {
        let fault = self
            .create_container_fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(error) = fault {
            return Err(error);
        }

        let mut containers = self.containers.write().await;
        if containers.contains_key(container) {
            return Err(ProviderError::new(
                409,
                CONTAINER_ALREADY_EXISTS,
                "The specified container already exists.",
            ));
        }
        containers.insert(container.to_string(), HashMap::new());
        self.counters.containers_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        conditions: UploadConditions,
    ) -> ProviderResult<BlobUploadResponse> {
        self.store(container, blob, data, &conditions).await
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
                    "Content-Length {} does not match {} bytes sent",
                    content_length,
                    data.len()
                ),
            ));
        }
        self.store(container, blob, Bytes::from(data), &UploadConditions::default())
            .await
    }

    async fn upload_stream(
        &self,
        container: &str,
        blob: &str,
        reader: BlobReader,
    ) -> ProviderResult<BlobUploadResponse> {
        let data = Self::drain(reader).await?;
        self.store(container, blob, Bytes::from(data), &UploadConditions::default())
            .await
    }

    async fn download(&self, container: &str, blob: &str) -> ProviderResult<Bytes> {
        let containers = self.containers.read().await;
        let blobs = containers.get(container).ok_or_else(container_not_found)?;
        blobs.get(blob).cloned().ok_or_else(|| {
            ProviderError::new(404, BLOB_NOT_FOUND, "The specified blob does not exist.")
        })
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> ProviderResult<bool> {
        Ok(self.blob(container, blob).await.is_some())
    }
}

/// Hands out one shared [`InMemoryBlobService`] per account name.
#[derive(Default)]
pub struct InMemoryConnector {
    services: Mutex<HashMap<String, Arc<InMemoryBlobService>>>,
    connects: AtomicU64,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The service backing an account, creating it on first use.
    pub fn service(&self, account_name: &str) -> Arc<InMemoryBlobService> {
        let mut services = self
            .services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        services
            .entry(account_name.to_string())
            .or_insert_with(|| Arc::new(InMemoryBlobService::new(account_name)))
            .clone()
    }

    /// Number of `connect` calls served.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl BlobServiceConnector for InMemoryConnector {
    fn connect(&self, account_name: &str) -> Arc<dyn BlobServiceClient> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.service(account_name)
    }
}
