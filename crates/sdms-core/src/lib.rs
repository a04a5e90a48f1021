//! SDMS Core Library
//!
//! This crate provides the domain types shared by every SDMS storage component:
//! the per-request execution context, the per-vendor cloud configuration, the blob
//! backend selection and the environment-driven service configuration.

pub mod cloud_platform;
pub mod config;
pub mod context;
pub mod storage_backend;

// Re-export commonly used types
pub use cloud_platform::CloudPlatform;
pub use config::{Config, LogFormat};
pub use storage_backend::StorageBackend;
pub use context::{
    AzureConfiguration, CloudConfiguration, ExecutionContext, GoogleConfiguration,
    StorageAccountNames,
};
