#[cfg(feature = "storage-azure")]
use crate::azure::AzureConnector;
#[cfg(feature = "storage-memory")]
use crate::memory::InMemoryConnector;
use crate::client::BlobServiceConnector;
use crate::traits::{StorageError, StorageResult};
use sdms_core::{Config, StorageBackend};
use std::sync::Arc;

/// Create the blob provider connector selected by configuration
pub fn create_connector(config: &Config) -> StorageResult<Arc<dyn BlobServiceConnector>> {
    tracing::info!(backend = %config.storage_backend, "Selecting blob provider");

    match config.storage_backend {
        #[cfg(feature = "storage-azure")]
        StorageBackend::Azure => Ok(Arc::new(AzureConnector::from_env()?)),

        #[cfg(not(feature = "storage-azure"))]
        StorageBackend::Azure => Err(StorageError::Configuration(
            "Azure blob backend not available (storage-azure feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => Ok(Arc::new(InMemoryConnector::new())),

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(StorageError::Configuration(
            "In-memory blob backend not available (storage-memory feature not enabled)".to_string(),
        )),
    }
}
