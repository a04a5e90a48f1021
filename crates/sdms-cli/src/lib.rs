//! Helpers shared by the `sdms` binary: service wiring, context building and
//! the storage smoke check.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use sdms_core::{Config, ExecutionContext};
use sdms_storage::{
    BlobServiceConnector, ConnectionPool, DownloadUrlOptions, LocationType, SasTokenOptions,
    StorageLocation, StorageService, UploadUrlOptions,
};
use serde::Serialize;
use uuid::Uuid;

pub const SAMPLE_BLOB_CONTENT: &str = "some file content";

pub fn build_service(connector: Arc<dyn BlobServiceConnector>) -> StorageService {
    StorageService::new(Arc::new(ConnectionPool::new(connector)))
}

/// Context for CLI calls: the configured partition and a fresh correlation id.
pub fn execution_context(config: &Config) -> ExecutionContext {
    ExecutionContext::new(
        String::new(),
        config.data_partition_id.clone(),
        config.cloud_configuration(),
    )
    .with_correlation_id(Uuid::new_v4().to_string())
}

pub fn parse_location(
    location_type: &str,
    file_name: &str,
    folder: Option<&str>,
) -> anyhow::Result<StorageLocation> {
    let location_type: LocationType = location_type
        .parse()
        .with_context(|| format!("Invalid location type '{}'", location_type))?;
    Ok(StorageLocation::new(location_type, file_name, folder))
}

pub fn expiration_after(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now + Duration::minutes(minutes)
}

#[derive(Debug, Serialize)]
pub struct SmokeReport {
    pub blob_name: String,
    pub upload_url: String,
    pub uploaded: bool,
    pub write_is_idempotent: bool,
    pub sas_token: String,
    pub download_url: String,
}

/// Write a uniquely named temporary blob, read it back, check that a second
/// write without overwrite keeps the first content, then sign a token and a
/// download URL for it.
pub async fn run_smoke(
    service: &StorageService,
    context: &ExecutionContext,
    now: DateTime<Utc>,
    url_expiration_minutes: i64,
) -> anyhow::Result<SmokeReport> {
    let blob_name = format!("{}.txt", Uuid::new_v4());
    let location = StorageLocation::temporary_large_blob(blob_name.clone(), None);
    let expiration = expiration_after(now, url_expiration_minutes);

    let upload_url = service
        .generate_upload_url(
            context,
            &location,
            &UploadUrlOptions {
                start: now,
                expiration,
                batch_upload: false,
                start_resumable: false,
            },
        )
        .await
        .context("Generate upload URL")?;

    service
        .write_buffer(context, &location, Bytes::from_static(SAMPLE_BLOB_CONTENT.as_bytes()), false)
        .await
        .context("Write sample blob")?;
    let uploaded = service.read_buffer(context, &location).await? == SAMPLE_BLOB_CONTENT.as_bytes();

    service
        .write_buffer(context, &location, Bytes::from_static(b"replacement"), false)
        .await
        .context("Repeat sample write")?;
    let write_is_idempotent =
        service.read_buffer(context, &location).await? == SAMPLE_BLOB_CONTENT.as_bytes();

    let sas_token = service
        .generate_sas_token(context, &location, &SasTokenOptions { start: now, expiration })
        .await
        .context("Generate SAS token")?;

    let download_url = service
        .generate_download_url(
            context,
            &location,
            &DownloadUrlOptions {
                start: now,
                expiration,
                batch_download: false,
            },
        )
        .await
        .context("Generate download URL")?;

    tracing::info!(blob = %blob_name, uploaded, write_is_idempotent, "Smoke check finished");

    Ok(SmokeReport {
        blob_name,
        upload_url,
        uploaded,
        write_is_idempotent,
        sas_token,
        download_url,
    })
}
