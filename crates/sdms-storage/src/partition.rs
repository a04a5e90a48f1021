//! Storage partition backed by user delegation SAS
//!
//! A partition owns the two account clients of one data partition (transfer
//! and permanent, possibly the same client) and the delegation-key cache for
//! them. Permanent location types live on the permanent account, temporary
//! ones on the transfer account.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::client::{BlobServiceClient, UploadConditions, UserDelegationKey, BLOB_ENDPOINT_SUFFIX};
use crate::clock::Clock;
use crate::delegation::DelegationKeyCache;
use crate::location::{AccountRole, LocationType, StorageLocation};
use crate::options::{DownloadUrlOptions, SasTokenOptions, UploadUrlOptions, WriteOptions, WriteResult};
use crate::sas::{BlobSasBuilder, SasPermissions, SasProtocol};
use crate::traits::{BlobReader, Storage, StorageError, StorageResult};

/// Extra validity added on top of the caller's requested expiration.
pub const SAS_TOKEN_VALIDITY_MINUTES: i64 = 60;

/// A location type resolved to its container and the client that owns it.
#[derive(Clone)]
pub struct ResolvedContainer {
    pub container_name: &'static str,
    pub client: Arc<dyn BlobServiceClient>,
}

impl ResolvedContainer {
    pub fn account_name(&self) -> &str {
        self.client.account_name()
    }
}

impl fmt::Debug for ResolvedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedContainer")
            .field("container_name", &self.container_name)
            .field("account_name", &self.client.account_name())
            .finish()
    }
}

/// Blob storage for one data partition
pub struct StoragePartition {
    transfer: Arc<dyn BlobServiceClient>,
    permanent: Arc<dyn BlobServiceClient>,
    delegation_keys: DelegationKeyCache,
}

impl StoragePartition {
    pub fn new(
        transfer: Arc<dyn BlobServiceClient>,
        permanent: Arc<dyn BlobServiceClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transfer,
            permanent,
            delegation_keys: DelegationKeyCache::new(clock),
        }
    }

    pub fn transfer_account_name(&self) -> &str {
        self.transfer.account_name()
    }

    pub fn permanent_account_name(&self) -> &str {
        self.permanent.account_name()
    }

    /// True when both roles share one client.
    pub fn shares_client(&self) -> bool {
        Arc::ptr_eq(&self.transfer, &self.permanent)
    }

    /// Map a location type to its container and owning client.
    ///
    /// `LocationType` is closed; unknown names are rejected when parsed.
    pub fn resolve_container(&self, location_type: LocationType) -> ResolvedContainer {
        let client = match location_type.account_role() {
            AccountRole::Transfer => self.transfer.clone(),
            AccountRole::Permanent => self.permanent.clone(),
        };
        ResolvedContainer {
            container_name: location_type.container_name(),
            client,
        }
    }

    pub async fn delegation_key(
        &self,
        client: &dyn BlobServiceClient,
    ) -> StorageResult<UserDelegationKey> {
        self.delegation_keys.get(client).await
    }

    pub fn delegation_keys(&self) -> &DelegationKeyCache {
        &self.delegation_keys
    }

    fn token_expiry(&self, expiration: DateTime<Utc>) -> DateTime<Utc> {
        expiration + Duration::minutes(SAS_TOKEN_VALIDITY_MINUTES)
    }

    /// Blob to scope a token to. An empty path addresses the container itself.
    fn signed_blob(blob_path: &str, container_scope: bool) -> Option<&str> {
        (!container_scope && !blob_path.is_empty()).then_some(blob_path)
    }

    fn signed_url(account_name: &str, container_name: &str, blob_path: &str, query: &str) -> String {
        let path = if blob_path.is_empty() {
            String::new()
        } else {
            format!("/{}", blob_path)
        };
        format!(
            "https://{}.{}/{}{}?{}",
            account_name, BLOB_ENDPOINT_SUFFIX, container_name, path, query
        )
    }
}

#[async_trait]
impl Storage for StoragePartition {
    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool> {
        let resolved = self.resolve_container(location.location_type);
        let exists = resolved
            .client
            .blob_exists(resolved.container_name, &location.blob_path())
            .await?;
        Ok(exists)
    }

    async fn write(
        &self,
        location: &StorageLocation,
        reader: BlobReader,
        options: Option<WriteOptions>,
    ) -> StorageResult<WriteResult> {
        let resolved = self.resolve_container(location.location_type);
        let blob_path = location.blob_path();
        let start = Instant::now();

        let response = match options.and_then(|o| o.content_length) {
            Some(content_length) => {
                resolved
                    .client
                    .upload(resolved.container_name, &blob_path, reader, content_length)
                    .await?
            }
            None => {
                resolved
                    .client
                    .upload_stream(resolved.container_name, &blob_path, reader)
                    .await?
            }
        };

        tracing::debug!(
            account = %resolved.account_name(),
            container = %resolved.container_name,
            blob = %blob_path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob written"
        );

        Ok(WriteResult {
            md5_hash: response
                .content_md5
                .map(|digest| BASE64_STANDARD.encode(digest)),
        })
    }

    async fn write_buffer(
        &self,
        location: &StorageLocation,
        data: Bytes,
        overwrite: bool,
    ) -> StorageResult<()> {
        let resolved = self.resolve_container(location.location_type);
        let conditions = if overwrite {
            UploadConditions::default()
        } else {
            UploadConditions::if_absent()
        };

        match resolved
            .client
            .upload_block_blob(resolved.container_name, &location.blob_path(), data, conditions)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if !overwrite && e.is_blob_already_exists() => {
                tracing::info!(
                    container = %resolved.container_name,
                    file_name = %location.file_name,
                    "File write skipped. File already exists at target location"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_buffer(&self, location: &StorageLocation) -> StorageResult<Bytes> {
        let resolved = self.resolve_container(location.location_type);

        match resolved
            .client
            .download(resolved.container_name, &location.blob_path())
            .await
        {
            Ok(data) => Ok(data),
            Err(e) if e.is_blob_not_found() => {
                tracing::error!(
                    error = %e,
                    container = %resolved.container_name,
                    file_name = %location.file_name,
                    "Error reading file"
                );
                Err(StorageError::NotFound(location.file_name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn generate_sas_token(
        &self,
        location: &StorageLocation,
        options: &SasTokenOptions,
    ) -> StorageResult<String> {
        let resolved = self.create_container(location).await?;
        let key = self.delegation_key(resolved.client.as_ref()).await?;
        let blob_path = location.blob_path();

        let query = BlobSasBuilder::new(resolved.container_name, self.token_expiry(options.expiration))
            .blob_name(Self::signed_blob(&blob_path, false))
            .permissions(SasPermissions::read_write())
            .protocol(SasProtocol::Https)
            .sign(&key, self.transfer_account_name())?;

        Ok(query.to_string())
    }

    async fn generate_upload_url(
        &self,
        location: &StorageLocation,
        options: &UploadUrlOptions,
    ) -> StorageResult<String> {
        let resolved = self.create_container(location).await?;
        let key = self.delegation_key(resolved.client.as_ref()).await?;
        let blob_path = location.blob_path();
        let account_name = self.transfer_account_name();

        let query = BlobSasBuilder::new(resolved.container_name, self.token_expiry(options.expiration))
            .blob_name(Self::signed_blob(&blob_path, options.batch_upload))
            .permissions(SasPermissions::read_write())
            .protocol(SasProtocol::Https)
            .sign(&key, account_name)?;

        Ok(Self::signed_url(
            account_name,
            resolved.container_name,
            &blob_path,
            &query.to_string(),
        ))
    }

    async fn generate_download_url(
        &self,
        location: &StorageLocation,
        options: &DownloadUrlOptions,
    ) -> StorageResult<String> {
        let resolved = self.create_container(location).await?;
        let key = self.delegation_key(resolved.client.as_ref()).await?;
        let blob_path = location.blob_path();
        let account_name = resolved.account_name();

        // Listing only makes sense for a container-scoped token over a folder.
        let permissions = SasPermissions {
            read: true,
            list: location.file_name.is_empty() && options.batch_download,
            ..SasPermissions::default()
        };

        let query = BlobSasBuilder::new(resolved.container_name, self.token_expiry(options.expiration))
            .blob_name(Self::signed_blob(&blob_path, options.batch_download))
            .permissions(permissions)
            .protocol(SasProtocol::Https)
            .sign(&key, account_name)?;

        Ok(Self::signed_url(
            account_name,
            resolved.container_name,
            &blob_path,
            &query.to_string(),
        ))
    }

    async fn create_container(&self, location: &StorageLocation) -> StorageResult<ResolvedContainer> {
        let resolved = self.resolve_container(location.location_type);
        let container = resolved.container_name;
        let account = resolved.account_name().to_string();

        let creation_failed = |e: crate::client::ProviderError| {
            tracing::error!(
                account = %account,
                container = %container,
                request_id = e.request_id.as_deref().unwrap_or("-"),
                status_code = e.status_code,
                error_code = e.error_code.as_deref().unwrap_or("-"),
                "Creating a container failed"
            );
            StorageError::ContainerCreation {
                container: container.to_string(),
                source: e,
            }
        };

        if resolved
            .client
            .container_exists(container)
            .await
            .map_err(creation_failed)?
        {
            tracing::debug!(account = %account, container = %container, "Container already exists");
            return Ok(resolved);
        }

        match resolved.client.create_container(container).await {
            Ok(()) => {
                tracing::info!(account = %account, container = %container, "Created container");
            }
            Err(e) if e.is_container_already_exists() => {
                tracing::info!(
                    account = %account,
                    container = %container,
                    "Container created concurrently"
                );
            }
            Err(e) => return Err(creation_failed(e)),
        }

        Ok(resolved)
    }
}

impl fmt::Debug for StoragePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoragePartition")
            .field("transfer", &self.transfer.account_name())
            .field("permanent", &self.permanent.account_name())
            .finish()
    }
}

#[cfg(all(test, feature = "storage-memory"))]
mod tests {
    use super::*;
    use crate::client::ProviderError;
    use crate::clock::FixedClock;
    use crate::memory::InMemoryBlobService;
    use chrono::TimeZone;

    struct Fixture {
        clock: Arc<FixedClock>,
        transfer: Arc<InMemoryBlobService>,
        permanent: Arc<InMemoryBlobService>,
        partition: StoragePartition,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
        let transfer = Arc::new(InMemoryBlobService::new("xferacct"));
        let permanent = Arc::new(InMemoryBlobService::new("permacct"));
        let partition = StoragePartition::new(transfer.clone(), permanent.clone(), clock.clone());
        Fixture {
            clock,
            transfer,
            permanent,
            partition,
        }
    }

    fn query_param<'a>(url_or_query: &'a str, name: &str) -> Option<&'a str> {
        let query = url_or_query.split_once('?').map_or(url_or_query, |(_, q)| q);
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then_some(value)
        })
    }

    #[test]
    fn resolves_location_types_to_accounts() {
        let f = fixture();
        for location_type in LocationType::ALL {
            let resolved = f.partition.resolve_container(location_type);
            assert_eq!(resolved.container_name, location_type.container_name());
            let expected = match location_type.account_role() {
                AccountRole::Transfer => "xferacct",
                AccountRole::Permanent => "permacct",
            };
            assert_eq!(resolved.account_name(), expected);
        }
    }

    #[test]
    fn shares_client_only_for_one_handle() {
        let f = fixture();
        assert!(!f.partition.shares_client());

        let shared = Arc::new(InMemoryBlobService::new("oneacct"));
        let partition = StoragePartition::new(shared.clone(), shared, f.clock.clone());
        assert!(partition.shares_client());
        assert_eq!(partition.transfer_account_name(), partition.permanent_account_name());
    }

    #[tokio::test]
    async fn token_caches_key_of_owning_account() {
        let f = fixture();
        let expiration = f.clock.now();
        f.partition
            .generate_sas_token(
                &StorageLocation::saved_transfers("f", None),
                &SasTokenOptions {
                    start: expiration,
                    expiration,
                },
            )
            .await
            .unwrap();

        let cached = f.partition.delegation_keys().cached("permacct").await.unwrap();
        assert_eq!(cached.expires_at, expiration + Duration::minutes(225));
        assert!(f.partition.delegation_keys().cached("xferacct").await.is_none());
    }

    #[tokio::test]
    async fn create_container_is_idempotent() {
        let f = fixture();
        let location = StorageLocation::data_large_blob("a", None);

        let first = f.partition.create_container(&location).await.unwrap();
        let second = f.partition.create_container(&location).await.unwrap();

        assert_eq!(first.container_name, "sdms-data-large-blob");
        assert_eq!(second.account_name(), "permacct");
        assert_eq!(f.permanent.stats().containers_created, 1);
        assert_eq!(f.transfer.stats().containers_created, 0);
    }

    #[tokio::test]
    async fn losing_container_creation_race_is_success() {
        let f = fixture();
        f.transfer
            .fail_next_create_container(ProviderError::new(409, "ContainerAlreadyExists", "exists"));

        let resolved = f
            .partition
            .create_container(&StorageLocation::temporary_large_blob("a", None))
            .await
            .unwrap();
        assert_eq!(resolved.container_name, "sdms-transfer-large-blob");
    }

    #[tokio::test]
    async fn container_creation_failure_surfaces_provider_error() {
        let f = fixture();
        f.transfer.fail_next_create_container(
            ProviderError::new(403, "AuthorizationPermissionMismatch", "denied")
                .with_request_id("req-1"),
        );

        let err = f
            .partition
            .create_container(&StorageLocation::temporary_large_blob("a", None))
            .await
            .unwrap_err();

        match err {
            StorageError::ContainerCreation { container, source } => {
                assert_eq!(container, "sdms-transfer-large-blob");
                assert_eq!(source.status_code, 403);
                assert_eq!(source.request_id.as_deref(), Some("req-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sas_token_adds_an_hour_and_grants_read_write() {
        let f = fixture();
        let expiration = f.clock.now();
        let token = f
            .partition
            .generate_sas_token(
                &StorageLocation::temporary_large_blob("f1.txt", Some("dir")),
                &SasTokenOptions {
                    start: expiration,
                    expiration,
                },
            )
            .await
            .unwrap();

        assert_eq!(query_param(&token, "se"), Some("2024-03-01T13%3A00%3A00Z"));
        assert_eq!(query_param(&token, "sp"), Some("rw"));
        assert_eq!(query_param(&token, "sr"), Some("b"));
        assert_eq!(query_param(&token, "spr"), Some("https"));
        assert!(query_param(&token, "st").is_none());
    }

    #[tokio::test]
    async fn upload_url_uses_transfer_account_even_for_permanent_locations() {
        let f = fixture();
        let expiration = f.clock.now();
        let url = f
            .partition
            .generate_upload_url(
                &StorageLocation::data_large_blob("f1.bin", Some("dir")),
                &UploadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_upload: false,
                    start_resumable: false,
                },
            )
            .await
            .unwrap();

        assert!(url.starts_with(
            "https://xferacct.blob.core.windows.net/sdms-data-large-blob/dir/f1.bin?"
        ));
        assert_eq!(query_param(&url, "sp"), Some("rw"));
        // Delegation key still comes from the account owning the container.
        assert_eq!(f.permanent.stats().delegation_key_requests, 1);
        assert_eq!(f.transfer.stats().delegation_key_requests, 0);
    }

    #[tokio::test]
    async fn batch_upload_scopes_token_to_container() {
        let f = fixture();
        let expiration = f.clock.now();
        let url = f
            .partition
            .generate_upload_url(
                &StorageLocation::in_progress_transfers("part-1", Some("xfer")),
                &UploadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_upload: true,
                    start_resumable: false,
                },
            )
            .await
            .unwrap();

        assert!(url.starts_with(
            "https://xferacct.blob.core.windows.net/sdms-transfer-xfers-in-progress/xfer/part-1?"
        ));
        assert_eq!(query_param(&url, "sr"), Some("c"));
    }

    #[tokio::test]
    async fn download_url_lists_only_for_batch_folder() {
        let f = fixture();
        let expiration = f.clock.now();
        let options = |batch_download| DownloadUrlOptions {
            start: expiration,
            expiration,
            batch_download,
        };

        let folder = StorageLocation::saved_transfers("", Some("xfer"));
        let file = StorageLocation::saved_transfers("f1.txt", Some("xfer"));

        let batch_folder = f.partition.generate_download_url(&folder, &options(true)).await.unwrap();
        let batch_file = f.partition.generate_download_url(&file, &options(true)).await.unwrap();
        let single_folder = f.partition.generate_download_url(&folder, &options(false)).await.unwrap();
        let single_file = f.partition.generate_download_url(&file, &options(false)).await.unwrap();

        assert_eq!(query_param(&batch_folder, "sp"), Some("rl"));
        assert_eq!(query_param(&batch_folder, "sr"), Some("c"));
        assert_eq!(query_param(&batch_file, "sp"), Some("r"));
        assert_eq!(query_param(&single_folder, "sp"), Some("r"));
        assert_eq!(query_param(&single_file, "sp"), Some("r"));
        assert_eq!(query_param(&single_file, "sr"), Some("b"));
    }

    #[tokio::test]
    async fn download_url_uses_resolved_account() {
        let f = fixture();
        let expiration = f.clock.now();
        let url = f
            .partition
            .generate_download_url(
                &StorageLocation::data_large_blob("f1.bin", None),
                &DownloadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_download: false,
                },
            )
            .await
            .unwrap();

        assert!(url.starts_with("https://permacct.blob.core.windows.net/sdms-data-large-blob/f1.bin?"));
    }

    #[tokio::test]
    async fn url_omits_path_for_empty_location() {
        let f = fixture();
        let expiration = f.clock.now();
        let url = f
            .partition
            .generate_download_url(
                &StorageLocation::temporary_large_blob("", None),
                &DownloadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_download: true,
                },
            )
            .await
            .unwrap();

        assert!(url.starts_with("https://xferacct.blob.core.windows.net/sdms-transfer-large-blob?"));
    }

    #[tokio::test]
    async fn empty_path_signs_container_scope() {
        let f = fixture();
        let expiration = f.clock.now();
        let location = StorageLocation::temporary_large_blob("", None);

        let token = f
            .partition
            .generate_sas_token(
                &location,
                &SasTokenOptions {
                    start: expiration,
                    expiration,
                },
            )
            .await
            .unwrap();
        let upload = f
            .partition
            .generate_upload_url(
                &location,
                &UploadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_upload: false,
                    start_resumable: false,
                },
            )
            .await
            .unwrap();
        let download = f
            .partition
            .generate_download_url(
                &location,
                &DownloadUrlOptions {
                    start: expiration,
                    expiration,
                    batch_download: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(query_param(&token, "sr"), Some("c"));
        assert_eq!(query_param(&token, "sp"), Some("rw"));
        assert_eq!(query_param(&upload, "sr"), Some("c"));
        assert!(download.starts_with("https://xferacct.blob.core.windows.net/sdms-transfer-large-blob?"));
        assert_eq!(query_param(&download, "sr"), Some("c"));
        assert_eq!(query_param(&download, "sp"), Some("r"));
    }

    #[tokio::test]
    async fn url_generation_reuses_cached_delegation_key() {
        let f = fixture();
        let expiration = f.clock.now();
        let options = SasTokenOptions {
            start: expiration,
            expiration,
        };
        let location = StorageLocation::temporary_large_blob("a", None);

        f.partition.generate_sas_token(&location, &options).await.unwrap();
        f.clock.advance(Duration::minutes(30));
        f.partition.generate_sas_token(&location, &options).await.unwrap();

        assert_eq!(f.transfer.stats().delegation_key_requests, 1);
    }

    #[tokio::test]
    async fn write_reports_base64_md5() {
        let f = fixture();
        let location = StorageLocation::temporary_large_blob("f.bin", Some("dir"));
        f.partition.create_container(&location).await.unwrap();

        let reader: BlobReader = Box::pin(std::io::Cursor::new(b"hello".to_vec()));
        let sized = f
            .partition
            .write(&location, reader, Some(WriteOptions::with_content_length(5)))
            .await
            .unwrap();

        let reader: BlobReader = Box::pin(std::io::Cursor::new(b"hello".to_vec()));
        let streamed = f.partition.write(&location, reader, None).await.unwrap();

        let expected = BASE64_STANDARD.encode(md5::compute(b"hello").0);
        assert_eq!(sized.md5_hash.as_deref(), Some(expected.as_str()));
        assert_eq!(streamed.md5_hash, sized.md5_hash);
        assert_eq!(
            f.transfer.blob("sdms-transfer-large-blob", "dir/f.bin").await.unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn read_of_missing_blob_names_the_file() {
        let f = fixture();
        let location = StorageLocation::temporary_large_blob("missing.txt", None);
        f.partition.create_container(&location).await.unwrap();

        let err = f.partition.read_buffer(&location).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref name) if name == "missing.txt"));
        assert_eq!(err.to_string(), "File not found reading file 'missing.txt'");
    }

    #[tokio::test]
    async fn write_into_missing_container_propagates() {
        let f = fixture();
        // Container never created: the provider reports ContainerNotFound, not BlobNotFound.
        let err = f
            .partition
            .write_buffer(&StorageLocation::temporary_large_blob("a", None), Bytes::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Provider(ref e) if e.status_code == 404));
    }

    #[tokio::test]
    async fn read_from_missing_container_is_not_a_missing_file() {
        let f = fixture();
        let err = f
            .partition
            .read_buffer(&StorageLocation::data_large_blob("f.bin", None))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::Provider(ref e) if e.has_error_code("ContainerNotFound")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn exists_checks_resolved_blob() {
        let f = fixture();
        let location = StorageLocation::saved_transfers("f", Some("d"));
        f.partition.create_container(&location).await.unwrap();

        assert!(!f.partition.exists(&location).await.unwrap());
        f.partition
            .write_buffer(&location, Bytes::from_static(b"x"), false)
            .await
            .unwrap();
        assert!(f.partition.exists(&location).await.unwrap());
    }
}
