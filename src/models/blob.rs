//! Represents a blob as read back from the storage service.

use crate::models::{content_settings::ContentSettings, metadata::Metadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Properties of a stored blob.
///
/// Carries what the Blob service reports in Get Blob Properties, not the
/// payload itself.
#[derive(Debug, Clone, Serialize)]
pub struct BlobProperties {
    /// Blob name within its container.
    pub name: String,

    /// Entity tag with the surrounding quotes removed.
    pub etag: String,

    /// When the blob was last written.
    pub last_modified: DateTime<Utc>,

    /// Size in bytes.
    pub content_length: u64,

    /// Content settings replayed on download.
    pub content_settings: ContentSettings,

    /// User metadata (`x-ms-meta-*`).
    pub metadata: Metadata,
}

impl BlobProperties {
    /// Reduce to the change-detection view used by incremental exports.
    pub fn file_stat(&self) -> FileStat {
        FileStat {
            checksum: self.etag.clone(),
            last_modified: self.last_modified.timestamp(),
        }
    }
}

/// "Has this file already been exported, and is it unchanged?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    /// Unquoted ETag.
    pub checksum: String,

    /// Unix timestamp in seconds.
    pub last_modified: i64,
}

/// A downloaded blob: its properties and its bytes.
#[derive(Debug, Clone)]
pub struct Blob {
    pub properties: BlobProperties,
    content: Bytes,
}

impl Blob {
    pub fn new(properties: BlobProperties, content: Bytes) -> Self {
        Self {
            properties,
            content,
        }
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

/// What the service reports back after a successful Put Blob.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub name: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}
