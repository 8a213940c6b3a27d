//! Service SAS generation for single blobs.
//!
//! Reference: <https://learn.microsoft.com/rest/api/storageservices/create-service-sas>

use crate::{
    errors::{ExportError, ExportResult},
    models::credentials::StorageCredentials,
    services::auth::{API_VERSION, compute_signature},
};
use chrono::{DateTime, Duration, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Default lifetime of a signed URL.
pub const DEFAULT_SAS_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

/// Longest signed URL lifetime accepted from configuration (one year).
pub const MAX_SAS_EXPIRY_SECS: i64 = 365 * 24 * 60 * 60;

/// Format of `se` (signed expiry) in tokens.
pub const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Permissions granted by a blob SAS, in the canonical `racwd` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
}

impl SasPermissions {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            add: false,
            create: false,
            write: false,
            delete: false,
        }
    }

    pub fn as_str(&self) -> String {
        [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
        ]
        .iter()
        .filter(|(granted, _)| *granted)
        .map(|(_, flag)| *flag)
        .collect()
    }
}

impl Default for SasPermissions {
    fn default() -> Self {
        Self::read_only()
    }
}

/// How signed URLs are minted: relative lifetime plus permissions.
#[derive(Debug, Clone, Copy)]
pub struct SignedUrlPolicy {
    pub expiry: Duration,
    pub permissions: SasPermissions,
}

impl SignedUrlPolicy {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            permissions: SasPermissions::read_only(),
        }
    }

    /// Policy from a lifetime in seconds, rejecting values outside
    /// `1..=MAX_SAS_EXPIRY_SECS`.
    pub fn from_secs(secs: i64) -> ExportResult<Self> {
        if !(1..=MAX_SAS_EXPIRY_SECS).contains(&secs) {
            return Err(ExportError::config(format!(
                "SAS expiry must be between 1 and {} seconds, got {}",
                MAX_SAS_EXPIRY_SECS, secs
            )));
        }
        Duration::try_seconds(secs)
            .map(Self::new)
            .ok_or_else(|| ExportError::config(format!("SAS expiry of {} seconds overflows", secs)))
    }

    /// Absolute expiry for a token signed at `now`, truncated to seconds.
    pub fn expires_at(&self, now: DateTime<Utc>) -> ExportResult<DateTime<Utc>> {
        let expiry = now.checked_add_signed(self.expiry).ok_or_else(|| {
            ExportError::config(format!("SAS expiry {} is out of range", self.expiry))
        })?;
        Ok(DateTime::from_timestamp(expiry.timestamp(), 0).unwrap_or(expiry))
    }
}

impl Default for SignedUrlPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SAS_EXPIRY_SECS))
    }
}

/// Canonicalized resource for a blob SAS: `/blob/{account}/{container}/{blob}`.
pub fn canonical_resource(account: &str, container: &str, blob: &str) -> String {
    format!("/blob/{}/{}/{}", account, container, blob)
}

/// String-to-sign for a blob service SAS (version 2020-12-06 and later).
///
/// Only permissions, expiry, resource and version are populated; every other
/// field (start, identifier, IP, protocol, snapshot, encryption scope,
/// response header overrides) is signed empty.
pub fn string_to_sign(
    permissions: &str,
    expiry: &str,
    canonical_resource: &str,
    version: &str,
    resource: &str,
) -> String {
    [
        permissions,
        "", // st
        expiry,
        canonical_resource,
        "", // si
        "", // sip
        "", // spr
        version,
        resource,
        "", // snapshot time
        "", // ses
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ]
    .join("\n")
}

/// Query string granting `permissions` on one blob until `expires_at`.
pub fn blob_sas_query(
    credentials: &StorageCredentials,
    container: &str,
    blob: &str,
    permissions: SasPermissions,
    expires_at: DateTime<Utc>,
) -> ExportResult<String> {
    let sp = permissions.as_str();
    let se = expires_at.format(SAS_TIME_FORMAT).to_string();
    let resource = canonical_resource(&credentials.account_name, container, blob);
    let to_sign = string_to_sign(&sp, &se, &resource, API_VERSION, "b");
    let sig = compute_signature(credentials, &to_sign)?;

    Ok(format!(
        "se={}&sp={}&sv={}&sr=b&sig={}",
        encode(&se),
        encode(&sp),
        API_VERSION,
        encode(&sig),
    ))
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}
