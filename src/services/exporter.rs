//! The export capability the framework adapters are written against.

use crate::{
    errors::ExportResult,
    models::blob::{FileStat, UploadReceipt},
    services::{
        azure_client::{AzureClient, UploadOptions},
        worker_pool::WorkerPool,
    },
};
use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use tracing::debug;

/// Somewhere exported files can be written to and probed.
///
/// Paths are relative; implementations decide how they map to storage keys.
pub trait Exporter: Send + Sync {
    /// Store `payload` under `path`, replacing anything already there.
    fn upload(
        &self,
        path: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> BoxFuture<'static, ExportResult<UploadReceipt>>;

    /// Report whether `path` was exported before, and what it looked like.
    fn probe(&self, path: &str) -> BoxFuture<'static, ExportResult<Option<FileStat>>>;
}

/// [`Exporter`] over Azure Blob Storage.
///
/// Blob names are `prefix + path`; collisions simply overwrite. Every call
/// runs as a task on the worker pool.
#[derive(Clone)]
pub struct BlobExporter {
    client: AzureClient,
    prefix: String,
    pool: WorkerPool,
}

impl BlobExporter {
    pub fn new(client: AzureClient, prefix: impl Into<String>, pool: WorkerPool) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            pool,
        }
    }

    /// Full blob name for a relative export path.
    pub fn blob_name(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl Exporter for BlobExporter {
    fn upload(
        &self,
        path: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> BoxFuture<'static, ExportResult<UploadReceipt>> {
        let client = self.client.clone();
        let blob_name = self.blob_name(path);
        debug!(blob = %blob_name, size_bytes = payload.len(), "queueing upload");
        self.pool
            .submit(async move { client.upload_with(&blob_name, payload, &options).await })
            .boxed()
    }

    fn probe(&self, path: &str) -> BoxFuture<'static, ExportResult<Option<FileStat>>> {
        let client = self.client.clone();
        let blob_name = self.blob_name(path);
        self.pool
            .submit(async move {
                let properties = client.get_properties(&blob_name).await?;
                Ok(properties.map(|p| p.file_stat()))
            })
            .boxed()
    }
}
