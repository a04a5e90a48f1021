//! Connection pool
//!
//! Maps data partition ids to lazily built storage partitions. Entries live for
//! the lifetime of the pool; partition ids form a small bounded set.

use std::collections::HashMap;
use std::sync::Arc;

use sdms_core::{CloudConfiguration, ExecutionContext};
use tokio::sync::RwLock;

use crate::client::BlobServiceConnector;
use crate::clock::{Clock, SystemClock};
use crate::partition::StoragePartition;
use crate::traits::{Storage, StorageError, StorageResult};

pub struct ConnectionPool {
    connector: Arc<dyn BlobServiceConnector>,
    clock: Arc<dyn Clock>,
    partitions: RwLock<HashMap<String, Arc<dyn Storage>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn BlobServiceConnector>) -> Self {
        Self::with_clock(connector, Arc::new(SystemClock))
    }

    pub fn with_clock(connector: Arc<dyn BlobServiceConnector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            connector,
            clock,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Storage handle for the context's data partition.
    ///
    /// The first call for a partition builds the account clients; when the
    /// transfer and permanent account names match, one client serves both.
    pub async fn get_partition(&self, context: &ExecutionContext) -> StorageResult<Arc<dyn Storage>> {
        let partition_id = context.data_partition_id.as_str();

        if let Some(partition) = self.partitions.read().await.get(partition_id) {
            return Ok(partition.clone());
        }

        let azure = match &context.cloud_configuration {
            CloudConfiguration::Azure(azure) => azure,
            other => {
                return Err(StorageError::Configuration(format!(
                    "cloud platform '{}' has no storage partition implementation",
                    other.platform()
                )))
            }
        };

        let accounts = &azure.storage_account_name;
        if accounts.transfer.is_empty() || accounts.permanent.is_empty() {
            return Err(StorageError::Configuration(format!(
                "storage account names missing for partition '{}'",
                partition_id
            )));
        }

        let transfer = self.connector.connect(&accounts.transfer);
        let permanent = if accounts.is_shared() {
            transfer.clone()
        } else {
            self.connector.connect(&accounts.permanent)
        };

        let partition: Arc<dyn Storage> =
            Arc::new(StoragePartition::new(transfer, permanent, self.clock.clone()));

        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry(partition_id.to_string())
            .or_insert(partition)
            .clone();

        tracing::info!(
            partition = %partition_id,
            transfer_account = %accounts.transfer,
            permanent_account = %accounts.permanent,
            "Storage partition ready"
        );

        Ok(partition)
    }

    pub async fn len(&self) -> usize {
        self.partitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.partitions.read().await.is_empty()
    }
}
