//! Request execution context
//!
//! Every storage call carries an [`ExecutionContext`] describing who is calling,
//! which data partition the call targets and which cloud accounts back that
//! partition. The context is built per request by the HTTP layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cloud_platform::CloudPlatform;

/// Storage account names backing a partition.
///
/// `transfer` holds temporary upload/download data, `permanent` holds committed
/// data. Both may name the same account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccountNames {
    pub transfer: String,
    pub permanent: String,
}

impl StorageAccountNames {
    /// Both roles served by a single account.
    pub fn shared(account_name: impl Into<String>) -> Self {
        let account_name = account_name.into();
        Self {
            transfer: account_name.clone(),
            permanent: account_name,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.transfer == self.permanent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfiguration {
    pub storage_account_name: StorageAccountNames,
    #[serde(default)]
    pub cosmos_account_name: String,
    #[serde(default)]
    pub cosmos_database_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfiguration {
    pub project_id: String,
}

/// Per-vendor cloud configuration, tagged by `cloudVendorName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cloudVendorName", rename_all = "lowercase")]
pub enum CloudConfiguration {
    Azure(AzureConfiguration),
    Google(GoogleConfiguration),
}

impl CloudConfiguration {
    pub fn platform(&self) -> CloudPlatform {
        match self {
            CloudConfiguration::Azure(_) => CloudPlatform::Azure,
            CloudConfiguration::Google(_) => CloudPlatform::Google,
        }
    }

    pub fn as_azure(&self) -> Option<&AzureConfiguration> {
        match self {
            CloudConfiguration::Azure(azure) => Some(azure),
            CloudConfiguration::Google(_) => None,
        }
    }
}

/// Caller identity and routing information for a single storage call.
///
/// `data_partition_id` keys the connection pool and must stay stable for the
/// lifetime of a partition handle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub data_partition_id: String,
    pub user_id: String,
    pub access_token: String,
    pub correlation_id: String,
    pub cloud_configuration: CloudConfiguration,
}

impl ExecutionContext {
    pub fn new(
        tenant_id: impl Into<String>,
        data_partition_id: impl Into<String>,
        cloud_configuration: CloudConfiguration,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            data_partition_id: data_partition_id.into(),
            user_id: String::new(),
            access_token: String::new(),
            correlation_id: String::new(),
            cloud_configuration,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

// The access token never reaches logs.
impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("tenant_id", &self.tenant_id)
            .field("data_partition_id", &self.data_partition_id)
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("correlation_id", &self.correlation_id)
            .field("cloud_configuration", &self.cloud_configuration)
            .finish()
    }
}
