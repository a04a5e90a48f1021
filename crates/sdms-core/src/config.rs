//! Configuration module
//!
//! This module loads the storage service configuration from the environment
//! (optionally seeded from a `.env` file) and turns it into the
//! [`CloudConfiguration`] carried by each [`crate::ExecutionContext`].

use std::env;

use crate::cloud_platform::CloudPlatform;
use crate::context::{AzureConfiguration, CloudConfiguration, GoogleConfiguration, StorageAccountNames};
use crate::storage_backend::StorageBackend;

const DEFAULT_SERVICE_NAME: &str = "sdms-server";
const DEFAULT_STORAGE_ACCOUNT_NAME: &str = "sdmsdataevdstor";
const DEFAULT_DATA_PARTITION_ID: &str = "test";
const URL_EXPIRATION_MINUTES: i64 = 10;
const DEFAULT_LOG_FILTER: &str = "sdms=info";
const ACCOUNT_NAME_KEYS: [&str; 3] = [
    "AZURE_STORAGE_ACCOUNT_NAME",
    "AZURE_TRANSFER_STORAGE_ACCOUNT_NAME",
    "AZURE_PERMANENT_STORAGE_ACCOUNT_NAME",
];

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Storage service configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub service_name: String,
    pub cloud_provider: CloudPlatform,
    pub storage_backend: StorageBackend,
    pub storage_accounts: StorageAccountNames,
    pub google_project_id: Option<String>,
    pub data_partition_id: String,
    pub url_expiration_minutes: i64,
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cloud_provider = match lookup("CLOUD_PROVIDER") {
            Some(value) => value.parse()?,
            None => CloudPlatform::Azure,
        };

        // Azure once any account is named, otherwise the in-memory provider.
        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None if ACCOUNT_NAME_KEYS.iter().any(|key| lookup(key).is_some()) => {
                StorageBackend::Azure
            }
            None => StorageBackend::Memory,
        };

        let default_account = lookup("AZURE_STORAGE_ACCOUNT_NAME")
            .unwrap_or_else(|| DEFAULT_STORAGE_ACCOUNT_NAME.to_string());
        let storage_accounts = StorageAccountNames {
            transfer: lookup("AZURE_TRANSFER_STORAGE_ACCOUNT_NAME")
                .unwrap_or_else(|| default_account.clone()),
            permanent: lookup("AZURE_PERMANENT_STORAGE_ACCOUNT_NAME")
                .unwrap_or_else(|| default_account.clone()),
        };

        let url_expiration_minutes = match lookup("URL_EXPIRATION_MINUTES") {
            Some(value) => value.trim().parse().map_err(|_| {
                anyhow::anyhow!("URL_EXPIRATION_MINUTES must be a whole number of minutes")
            })?,
            None => URL_EXPIRATION_MINUTES,
        };

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => return Err(anyhow::anyhow!("Invalid LOG_FORMAT: {}", other)),
        };

        let config = Config {
            environment,
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            cloud_provider,
            storage_backend,
            storage_accounts,
            google_project_id: lookup("GOOGLE_PROJECT_ID"),
            data_partition_id: lookup("DATA_PARTITION_ID")
                .unwrap_or_else(|| DEFAULT_DATA_PARTITION_ID.to_string()),
            url_expiration_minutes,
            log_format,
            log_filter: lookup("LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage_accounts.transfer.trim().is_empty()
            || self.storage_accounts.permanent.trim().is_empty()
        {
            return Err(anyhow::anyhow!("Storage account names must not be empty"));
        }

        if self.cloud_provider == CloudPlatform::Google
            && self
                .google_project_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(anyhow::anyhow!(
                "GOOGLE_PROJECT_ID must be set when CLOUD_PROVIDER is google"
            ));
        }

        if self.url_expiration_minutes <= 0 {
            return Err(anyhow::anyhow!("URL_EXPIRATION_MINUTES must be positive"));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    /// Cloud configuration to place in an execution context.
    pub fn cloud_configuration(&self) -> CloudConfiguration {
        match self.cloud_provider {
            CloudPlatform::Azure => CloudConfiguration::Azure(AzureConfiguration {
                storage_account_name: self.storage_accounts.clone(),
                cosmos_account_name: String::new(),
                cosmos_database_name: String::new(),
            }),
            CloudPlatform::Google => CloudConfiguration::Google(GoogleConfiguration {
                project_id: self.google_project_id.clone().unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_share_one_account() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.cloud_provider, CloudPlatform::Azure);
        assert_eq!(config.storage_accounts, StorageAccountNames::shared("sdmsdataevdstor"));
        assert_eq!(config.data_partition_id, "test");
        assert_eq!(config.url_expiration_minutes, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(!config.is_production());
    }

    #[test]
    fn named_account_selects_azure_backend() {
        let config = config_from(&[("AZURE_TRANSFER_STORAGE_ACCOUNT_NAME", "xfer")]).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Azure);

        let config = config_from(&[
            ("AZURE_STORAGE_ACCOUNT_NAME", "acct"),
            ("STORAGE_BACKEND", "memory"),
        ])
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);

        assert!(config_from(&[("STORAGE_BACKEND", "s3")]).is_err());
    }

    #[test]
    fn role_specific_accounts_override_default() {
        let config = config_from(&[
            ("AZURE_STORAGE_ACCOUNT_NAME", "shared"),
            ("AZURE_PERMANENT_STORAGE_ACCOUNT_NAME", "perm"),
        ])
        .unwrap();

        assert_eq!(config.storage_accounts.transfer, "shared");
        assert_eq!(config.storage_accounts.permanent, "perm");

        let cloud = config.cloud_configuration();
        assert_eq!(cloud.as_azure().unwrap().storage_account_name.permanent, "perm");
    }

    #[test]
    fn google_requires_project_id() {
        assert!(config_from(&[("CLOUD_PROVIDER", "google")]).is_err());

        let config =
            config_from(&[("CLOUD_PROVIDER", "google"), ("GOOGLE_PROJECT_ID", "proj")]).unwrap();
        assert_eq!(config.cloud_configuration().platform(), CloudPlatform::Google);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(config_from(&[("URL_EXPIRATION_MINUTES", "abc")]).is_err());
        assert!(config_from(&[("URL_EXPIRATION_MINUTES", "0")]).is_err());
        assert!(config_from(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(config_from(&[("AZURE_TRANSFER_STORAGE_ACCOUNT_NAME", " ")]).is_err());
    }

    #[test]
    fn production_environment_detected() {
        let config = config_from(&[("ENVIRONMENT", "Prod"), ("LOG_FORMAT", "json")]).unwrap();
        assert!(config.is_production());
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
