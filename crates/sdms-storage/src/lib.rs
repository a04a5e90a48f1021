//! SDMS Storage Library
//!
//! This crate resolves logical storage locations to concrete blob containers and
//! hands out time-limited signed URLs, SAS tokens and buffered/streamed blob I/O
//! for them.
//!
//! # Layers
//!
//! - **location**: the closed catalog of location kinds and their containers.
//! - **client**: the port to the blob provider's network client.
//! - **azure**: that port over `azure_storage_blobs` (feature `storage-azure`).
//! - **memory**: an in-process provider (feature `storage-memory`).
//! - **delegation**: per-account cache of user delegation keys.
//! - **sas**: user delegation SAS signing.
//! - **partition**: one tenant partition's transfer/permanent accounts.
//! - **pool**: lazily built partitions keyed by data partition id.
//! - **service**: the context-aware, logging facade callers use.
//!
//! # Container naming
//!
//! Container names are fixed and shared with existing data:
//!
//! - `PermanentLargeBlob` → `sdms-data-large-blob`
//! - `PermanentSavedTransfers` → `sdms-data-xfers-in-saved`
//! - `TemporaryLargeBlob` → `sdms-transfer-large-blob`
//! - `TemporaryTransferInProgress` → `sdms-transfer-xfers-in-progress`

#[cfg(feature = "storage-azure")]
pub mod azure;
pub mod client;
pub mod clock;
pub mod delegation;
pub mod factory;
pub mod location;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub mod options;
pub mod partition;
pub mod pool;
pub mod sas;
pub mod service;
pub mod traits;

// Re-export commonly used types
pub use client::{
    BlobServiceClient, BlobServiceConnector, BlobUploadResponse, ProviderError, ProviderResult,
    UploadConditions, UserDelegationKey,
};
#[cfg(feature = "storage-azure")]
pub use azure::{AzureBlobService, AzureConnector};
pub use clock::{Clock, FixedClock, SystemClock};
pub use delegation::{CachedDelegationKey, DelegationKeyCache};
pub use factory::create_connector;
pub use location::{LocationType, StorageLocation};
#[cfg(feature = "storage-memory")]
pub use memory::{InMemoryBlobService, InMemoryConnector, InMemoryStats};
pub use options::{DownloadUrlOptions, SasTokenOptions, UploadUrlOptions, WriteOptions, WriteResult};
pub use partition::{ResolvedContainer, StoragePartition};
pub use pool::ConnectionPool;
pub use service::StorageService;
pub use traits::{BlobReader, Storage, StorageError, StorageResult};
