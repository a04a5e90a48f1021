//! Location catalog
//!
//! Callers address blobs by a logical [`StorageLocation`]: a file name, an
//! optional folder and one of four [`LocationType`]s. The location type alone
//! decides the container and which of the partition's accounts holds it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::traits::StorageError;

pub const PERMANENT_LARGE_BLOB_CONTAINER: &str = "sdms-data-large-blob";
pub const PERMANENT_SAVED_TRANSFERS_CONTAINER: &str = "sdms-data-xfers-in-saved";
pub const TEMPORARY_LARGE_BLOB_CONTAINER: &str = "sdms-transfer-large-blob";
pub const TEMPORARY_TRANSFER_IN_PROGRESS_CONTAINER: &str = "sdms-transfer-xfers-in-progress";

/// Which of a partition's two accounts backs a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Transfer,
    Permanent,
}

/// Closed classification of storage purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LocationType {
    /// Immutable binary files
    PermanentLargeBlob,
    /// Immutable revision files
    PermanentSavedTransfers,
    /// Temporary binary files
    TemporaryLargeBlob,
    /// Temporary files holding revision items
    TemporaryTransferInProgress,
}

impl LocationType {
    pub const ALL: [LocationType; 4] = [
        LocationType::PermanentLargeBlob,
        LocationType::PermanentSavedTransfers,
        LocationType::TemporaryLargeBlob,
        LocationType::TemporaryTransferInProgress,
    ];

    pub fn container_name(self) -> &'static str {
        match self {
            LocationType::PermanentLargeBlob => PERMANENT_LARGE_BLOB_CONTAINER,
            LocationType::PermanentSavedTransfers => PERMANENT_SAVED_TRANSFERS_CONTAINER,
            LocationType::TemporaryLargeBlob => TEMPORARY_LARGE_BLOB_CONTAINER,
            LocationType::TemporaryTransferInProgress => TEMPORARY_TRANSFER_IN_PROGRESS_CONTAINER,
        }
    }

    pub fn account_role(self) -> AccountRole {
        match self {
            LocationType::PermanentLargeBlob | LocationType::PermanentSavedTransfers => {
                AccountRole::Permanent
            }
            LocationType::TemporaryLargeBlob | LocationType::TemporaryTransferInProgress => {
                AccountRole::Transfer
            }
        }
    }

    /// Name used on the wire and in persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            LocationType::PermanentLargeBlob => "DataLargeBlob",
            LocationType::PermanentSavedTransfers => "DataSavedTransfers",
            LocationType::TemporaryLargeBlob => "TemporaryLargeBlob",
            LocationType::TemporaryTransferInProgress => "TemporaryTransferInProgress",
        }
    }
}

impl FromStr for LocationType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DataLargeBlob" | "PermanentLargeBlob" => Ok(LocationType::PermanentLargeBlob),
            "DataSavedTransfers" | "PermanentSavedTransfers" => {
                Ok(LocationType::PermanentSavedTransfers)
            }
            "TemporaryLargeBlob" => Ok(LocationType::TemporaryLargeBlob),
            "TemporaryTransferInProgress" => Ok(LocationType::TemporaryTransferInProgress),
            other => Err(StorageError::UnresolvedLocationType(other.to_string())),
        }
    }
}

impl TryFrom<String> for LocationType {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocationType> for String {
    fn from(value: LocationType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical address of a blob.
///
/// An empty file name addresses the folder (or the whole container) for batch
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageLocation {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub location_type: LocationType,
}

impl StorageLocation {
    pub fn new(location_type: LocationType, name: impl Into<String>, folder: Option<&str>) -> Self {
        Self {
            file_name: name.into(),
            folder: folder.map(str::to_string),
            location_type,
        }
    }

    pub fn data_large_blob(name: impl Into<String>, folder: Option<&str>) -> Self {
        Self::new(LocationType::PermanentLargeBlob, name, folder)
    }

    pub fn temporary_large_blob(name: impl Into<String>, folder: Option<&str>) -> Self {
        Self::new(LocationType::TemporaryLargeBlob, name, folder)
    }

    pub fn saved_transfers(name: impl Into<String>, folder: Option<&str>) -> Self {
        Self::new(LocationType::PermanentSavedTransfers, name, folder)
    }

    pub fn in_progress_transfers(name: impl Into<String>, folder: Option<&str>) -> Self {
        Self::new(LocationType::TemporaryTransferInProgress, name, folder)
    }

    /// Blob path inside the container: `folder/file`, either part may be empty.
    pub fn blob_path(&self) -> String {
        let mut path = self.folder.clone().unwrap_or_default();
        if !self.file_name.is_empty() {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&self.file_name);
        }
        path
    }

    pub fn container_name(&self) -> &'static str {
        self.location_type.container_name()
    }
}
