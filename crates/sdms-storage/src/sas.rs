//! User delegation SAS signing
//!
//! Token = query parameters + `sig`, where
//! `sig = base64(HMAC-SHA256(base64decode(key.value), string_to_sign))`.
//! The string-to-sign layout is the one of service version 2020-12-06.
//! Signing is CPU-only; the delegation key is fetched beforehand.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use crate::client::UserDelegationKey;
use crate::traits::{StorageError, StorageResult};

pub const SAS_VERSION: &str = "2020-12-06";

const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// ISO 8601 without fractional seconds, as the provider expects.
pub fn format_sas_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for SasPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letters = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ];
        for (granted, letter) in letters {
            if granted {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SasProtocol {
    #[default]
    Https,
    HttpsAndHttp,
}

impl SasProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            SasProtocol::Https => "https",
            SasProtocol::HttpsAndHttp => "https,http",
        }
    }
}

/// Builder for a blob or container scoped SAS.
#[derive(Debug, Clone)]
pub struct BlobSasBuilder<'a> {
    container_name: &'a str,
    blob_name: Option<&'a str>,
    permissions: SasPermissions,
    protocol: SasProtocol,
    starts_on: Option<DateTime<Utc>>,
    expires_on: DateTime<Utc>,
}

impl<'a> BlobSasBuilder<'a> {
    pub fn new(container_name: &'a str, expires_on: DateTime<Utc>) -> Self {
        Self {
            container_name,
            blob_name: None,
            permissions: SasPermissions::default(),
            protocol: SasProtocol::Https,
            starts_on: None,
            expires_on,
        }
    }

    /// Pin the signature to one blob; `None` or an empty name scopes it to the
    /// container.
    pub fn blob_name(mut self, blob_name: Option<&'a str>) -> Self {
        self.blob_name = blob_name.filter(|name| !name.is_empty());
        self
    }

    pub fn permissions(mut self, permissions: SasPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn protocol(mut self, protocol: SasProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn starts_on(mut self, starts_on: DateTime<Utc>) -> Self {
        self.starts_on = Some(starts_on);
        self
    }

    fn canonical_resource(&self, account_name: &str) -> String {
        match self.blob_name {
            Some(blob) => format!("/blob/{}/{}/{}", account_name, self.container_name, blob),
            None => format!("/blob/{}/{}", account_name, self.container_name),
        }
    }

    pub fn sign(
        &self,
        key: &UserDelegationKey,
        account_name: &str,
    ) -> StorageResult<SasQueryParameters> {
        let mut params = SasQueryParameters {
            version: SAS_VERSION.to_string(),
            protocol: self.protocol.as_str().to_string(),
            starts_on: self.starts_on.as_ref().map(format_sas_time),
            expires_on: format_sas_time(&self.expires_on),
            signed_object_id: key.signed_object_id.clone(),
            signed_tenant_id: key.signed_tenant_id.clone(),
            signed_key_starts_on: format_sas_time(&key.signed_starts_on),
            signed_key_expires_on: format_sas_time(&key.signed_expires_on),
            signed_key_service: key.signed_service.clone(),
            signed_key_version: key.signed_version.clone(),
            resource: if self.blob_name.is_some() { "b" } else { "c" }.to_string(),
            permissions: self.permissions.to_string(),
            signature: String::new(),
        };

        let canonical_resource = self.canonical_resource(account_name);
        let string_to_sign = [
            params.permissions.as_str(),
            params.starts_on.as_deref().unwrap_or(""),
            params.expires_on.as_str(),
            canonical_resource.as_str(),
            params.signed_object_id.as_str(),
            params.signed_tenant_id.as_str(),
            params.signed_key_starts_on.as_str(),
            params.signed_key_expires_on.as_str(),
            params.signed_key_service.as_str(),
            params.signed_key_version.as_str(),
            "", // signedAuthorizedUserObjectId
            "", // signedUnauthorizedUserObjectId
            "", // signedCorrelationId
            "", // signedIP
            params.protocol.as_str(),
            params.version.as_str(),
            params.resource.as_str(),
            "", // signedSnapshotTime
            "", // signedEncryptionScope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n");

        let key_bytes = BASE64_STANDARD
            .decode(&key.value)
            .map_err(|e| StorageError::Signing(format!("invalid delegation key value: {}", e)))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
            .map_err(|e| StorageError::Signing(format!("HMAC key error: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        params.signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(params)
    }
}

/// Signed SAS parameters; `Display` renders the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasQueryParameters {
    pub version: String,
    pub protocol: String,
    pub starts_on: Option<String>,
    pub expires_on: String,
    pub signed_object_id: String,
    pub signed_tenant_id: String,
    pub signed_key_starts_on: String,
    pub signed_key_expires_on: String,
    pub signed_key_service: String,
    pub signed_key_version: String,
    pub resource: String,
    pub permissions: String,
    pub signature: String,
}

impl fmt::Display for SasQueryParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<(&str, &str)> = vec![("sv", &self.version), ("spr", &self.protocol)];
        if let Some(starts_on) = &self.starts_on {
            pairs.push(("st", starts_on));
        }
        pairs.extend([
            ("se", self.expires_on.as_str()),
            ("skoid", self.signed_object_id.as_str()),
            ("sktid", self.signed_tenant_id.as_str()),
            ("skt", self.signed_key_starts_on.as_str()),
            ("ske", self.signed_key_expires_on.as_str()),
            ("sks", self.signed_key_service.as_str()),
            ("skv", self.signed_key_version.as_str()),
            ("sr", self.resource.as_str()),
            ("sp", self.permissions.as_str()),
            ("sig", self.signature.as_str()),
        ]);

        for (i, (name, value)) in pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", name, utf8_percent_encode(value, QUERY_VALUE))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> UserDelegationKey {
        UserDelegationKey {
            signed_object_id: "oid-1".to_string(),
            signed_tenant_id: "tid-1".to_string(),
            signed_starts_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            signed_expires_on: Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap(),
            signed_service: "b".to_string(),
            signed_version: "2020-12-06".to_string(),
            value: BASE64_STANDARD.encode(b"0123456789abcdef0123456789abcdef"),
        }
    }

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap()
    }

    #[test]
    fn permissions_render_in_canonical_order() {
        assert_eq!(SasPermissions::read_write().to_string(), "rw");
        let read_list = SasPermissions {
            read: true,
            list: true,
            ..Default::default()
        };
        assert_eq!(read_list.to_string(), "rl");
        assert_eq!(SasPermissions::default().to_string(), "");
    }

    #[test]
    fn signature_matches_string_to_sign_layout() {
        let params = BlobSasBuilder::new("container", expiry())
            .blob_name(Some("dir/file.txt"))
            .permissions(SasPermissions::read_write())
            .sign(&key(), "acct")
            .unwrap();

        let expected_string_to_sign = [
            "rw",
            "",
            "2024-01-01T02:30:00Z",
            "/blob/acct/container/dir/file.txt",
            "oid-1",
            "tid-1",
            "2024-01-01T00:00:00Z",
            "2024-01-01T04:00:00Z",
            "b",
            "2020-12-06",
            "",
            "",
            "",
            "",
            "https",
            "2020-12-06",
            "b",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n");
        let mut mac = Hmac::<Sha256>::new_from_slice(b"0123456789abcdef0123456789abcdef").unwrap();
        mac.update(expected_string_to_sign.as_bytes());
        let expected = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(params.signature, expected);
    }

    #[test]
    fn container_scope_uses_container_resource() {
        let container = BlobSasBuilder::new("container", expiry())
            .permissions(SasPermissions::read_write())
            .sign(&key(), "acct")
            .unwrap();
        let blob = BlobSasBuilder::new("container", expiry())
            .blob_name(Some("file"))
            .permissions(SasPermissions::read_write())
            .sign(&key(), "acct")
            .unwrap();

        assert_eq!(container.resource, "c");
        assert_eq!(blob.resource, "b");
        assert_ne!(container.signature, blob.signature);
    }

    #[test]
    fn empty_blob_name_signs_the_container() {
        let empty = BlobSasBuilder::new("container", expiry())
            .blob_name(Some(""))
            .permissions(SasPermissions::read_write())
            .sign(&key(), "acct")
            .unwrap();
        let container = BlobSasBuilder::new("container", expiry())
            .permissions(SasPermissions::read_write())
            .sign(&key(), "acct")
            .unwrap();

        assert_eq!(empty.resource, "c");
        assert_eq!(empty.signature, container.signature);
    }

    #[test]
    fn account_name_is_part_of_signature() {
        let builder = BlobSasBuilder::new("container", expiry()).blob_name(Some("file"));
        let a = builder.sign(&key(), "acct-a").unwrap();
        let b = builder.sign(&key(), "acct-b").unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn query_string_is_percent_encoded() {
        let params = BlobSasBuilder::new("container", expiry())
            .blob_name(Some("file"))
            .permissions(SasPermissions::read_write())
            .starts_on(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap())
            .sign(&key(), "acct")
            .unwrap();

        let query = params.to_string();
        assert!(query.starts_with("sv=2020-12-06&spr=https&st=2024-01-01T01%3A00%3A00Z&"));
        assert!(query.contains("&se=2024-01-01T02%3A30%3A00Z&"));
        assert!(query.contains("&sr=b&sp=rw&sig="));
        let sig = query.rsplit("sig=").next().unwrap();
        assert!(!sig.contains('+') && !sig.contains('/') && !sig.contains('='));
    }

    #[test]
    fn invalid_key_value_is_a_signing_error() {
        let mut bad = key();
        bad.value = "not base64!".to_string();
        let err = BlobSasBuilder::new("container", expiry())
            .sign(&bad, "acct")
            .unwrap_err();
        assert!(matches!(err, StorageError::Signing(_)));
    }
}
