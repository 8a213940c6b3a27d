//! Export crawl output to Azure Blob Storage.
//!
//! [`AzureClient`] talks to one container: upload, download, property probes
//! and SAS URL signing. [`BlobExporter`] puts it behind the [`Exporter`]
//! capability and runs calls on a bounded [`WorkerPool`]. The adapters in
//! [`pipelines`] are what a crawl framework plugs in.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;

pub use config::{ExporterConfig, MissingContainerPolicy, Settings};
pub use errors::{ExportError, ExportResult};
pub use services::{
    azure_client::{AzureClient, UploadOptions},
    exporter::{BlobExporter, Exporter},
    sas::SignedUrlPolicy,
    worker_pool::WorkerPool,
};
