use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Blob provider the storage layer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Azure Blob Storage over the network
    Azure,
    /// Process-local blobs, gone when the process exits
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(StorageBackend::Azure),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Azure => write!(f, "azure"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}
