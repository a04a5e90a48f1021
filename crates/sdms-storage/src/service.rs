//! Context-aware storage facade
//!
//! One pool lookup per call, with the caller's correlation id and tenant on
//! every log line.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use sdms_core::ExecutionContext;

use crate::location::StorageLocation;
use crate::options::{DownloadUrlOptions, SasTokenOptions, UploadUrlOptions, WriteOptions, WriteResult};
use crate::partition::ResolvedContainer;
use crate::pool::ConnectionPool;
use crate::traits::{BlobReader, Storage, StorageResult};

#[derive(Clone)]
pub struct StorageService {
    pool: Arc<ConnectionPool>,
}

fn log_outcome<T>(
    operation: &'static str,
    context: &ExecutionContext,
    location: &StorageLocation,
    start: Instant,
    result: &StorageResult<T>,
) {
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(_) => tracing::debug!(
            operation,
            correlation_id = %context.correlation_id,
            tenant = %context.tenant_id,
            partition = %context.data_partition_id,
            location_type = %location.location_type,
            file_name = %location.file_name,
            duration_ms,
            "Storage operation completed"
        ),
        Err(e) => tracing::error!(
            operation,
            error = %e,
            correlation_id = %context.correlation_id,
            tenant = %context.tenant_id,
            partition = %context.data_partition_id,
            location_type = %location.location_type,
            file_name = %location.file_name,
            duration_ms,
            "Storage operation failed"
        ),
    }
}

fn log_start(operation: &'static str, context: &ExecutionContext, location: &StorageLocation) {
    tracing::debug!(
        operation,
        correlation_id = %context.correlation_id,
        tenant = %context.tenant_id,
        partition = %context.data_partition_id,
        location_type = %location.location_type,
        file_name = %location.file_name,
        folder = location.folder.as_deref().unwrap_or(""),
        "Storage operation started"
    );
}

impl StorageService {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    async fn partition(&self, context: &ExecutionContext) -> StorageResult<Arc<dyn Storage>> {
        self.pool.get_partition(context).await
    }

    pub async fn exists(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
    ) -> StorageResult<bool> {
        log_start("exists", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .exists(location)
                .await
        }
        .await;
        log_outcome("exists", context, location, start, &result);
        result
    }

    pub async fn write(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
        reader: BlobReader,
        options: Option<WriteOptions>,
    ) -> StorageResult<WriteResult> {
        log_start("write", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .write(location, reader, options)
                .await
        }
        .await;
        log_outcome("write", context, location, start, &result);
        result
    }

    pub async fn write_buffer(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
        data: Bytes,
        overwrite: bool,
    ) -> StorageResult<()> {
        log_start("write_buffer", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .write_buffer(location, data, overwrite)
                .await
        }
        .await;
        log_outcome("write_buffer", context, location, start, &result);
        result
    }

    pub async fn read_buffer(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
    ) -> StorageResult<Bytes> {
        log_start("read_buffer", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .read_buffer(location)
                .await
        }
        .await;
        log_outcome("read_buffer", context, location, start, &result);
        result
    }

    pub async fn generate_sas_token(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
        options: &SasTokenOptions,
    ) -> StorageResult<String> {
        log_start("generate_sas_token", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .generate_sas_token(location, options)
                .await
        }
        .await;
        log_outcome("generate_sas_token", context, location, start, &result);
        result
    }

    pub async fn generate_upload_url(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
        options: &UploadUrlOptions,
    ) -> StorageResult<String> {
        log_start("generate_upload_url", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .generate_upload_url(location, options)
                .await
        }
        .await;
        log_outcome("generate_upload_url", context, location, start, &result);
        result
    }

    pub async fn generate_download_url(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
        options: &DownloadUrlOptions,
    ) -> StorageResult<String> {
        log_start("generate_download_url", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .generate_download_url(location, options)
                .await
        }
        .await;
        log_outcome("generate_download_url", context, location, start, &result);
        result
    }

    pub async fn create_container(
        &self,
        context: &ExecutionContext,
        location: &StorageLocation,
    ) -> StorageResult<ResolvedContainer> {
        log_start("create_container", context, location);
        let start = Instant::now();
        let result = async {
            self.partition(context)
                .await?
                .create_container(location)
                .await
        }
        .await;
        log_outcome("create_container", context, location, start, &result);
        result
    }
}
