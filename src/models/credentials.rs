//! Storage account credentials.

use crate::errors::{ExportError, ExportResult};
use base64::{Engine as _, engine::general_purpose};
use std::fmt;

/// Account and key published by the Azurite emulator for local development.
pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Everything needed to sign requests for one storage account.
///
/// Built once at startup and shared read-only afterwards. The account key is
/// kept decoded since every signature needs the raw bytes.
#[derive(Clone)]
pub struct StorageCredentials {
    /// Storage account name, e.g. `mystorageaccount`.
    pub account_name: String,

    /// Decoded account key.
    account_key: Vec<u8>,

    /// Blob service base URL without a trailing slash.
    pub blob_endpoint: String,
}

impl StorageCredentials {
    /// Build credentials from an account name and its base64 account key.
    pub fn from_account_key(
        account_name: impl Into<String>,
        account_key: &str,
    ) -> ExportResult<Self> {
        let account_name = account_name.into();
        if account_name.is_empty() {
            return Err(ExportError::config("account name is empty"));
        }
        let account_key = decode_key(account_key)?;
        let blob_endpoint = format!("https://{}.blob.core.windows.net", account_name);

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }

    /// Parse an Azure Storage connection string.
    ///
    /// Understands `AccountName`, `AccountKey`, `DefaultEndpointsProtocol`,
    /// `EndpointSuffix`, `BlobEndpoint` and `UseDevelopmentStorage=true`.
    /// Keys are matched case-insensitively and unknown keys are ignored.
    pub fn from_connection_string(connection_string: &str) -> ExportResult<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;
        let mut development = false;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ExportError::config(format!("malformed connection string segment `{}`", part))
            })?;
            match key.to_ascii_lowercase().as_str() {
                "accountname" => account_name = Some(value.to_string()),
                "accountkey" => account_key = Some(value.to_string()),
                "defaultendpointsprotocol" => protocol = value.to_ascii_lowercase(),
                "endpointsuffix" => suffix = value.to_string(),
                "blobendpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            return Ok(Self {
                account_name: DEV_ACCOUNT_NAME.to_string(),
                account_key: decode_key(DEV_ACCOUNT_KEY)?,
                blob_endpoint: blob_endpoint.unwrap_or_else(|| DEV_BLOB_ENDPOINT.to_string()),
            });
        }

        let account_name = account_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ExportError::config("connection string has no AccountName"))?;
        let account_key = account_key
            .ok_or_else(|| ExportError::config("connection string has no AccountKey"))?;

        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Ok(Self {
            account_name,
            account_key: decode_key(&account_key)?,
            blob_endpoint,
        })
    }

    /// Point the credentials at another blob endpoint (emulators, private links).
    #[must_use]
    pub fn with_blob_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.blob_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.account_key
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"[REDACTED]")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

fn decode_key(key: &str) -> ExportResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(key.trim())
        .map_err(|err| ExportError::config(format!("account key is not valid base64: {}", err)))
}
