//! Data feed adapter: the whole feed goes to one configured blob.

use crate::{
    config::{EXPORT_FILENAME, ExporterConfig, MissingContainerPolicy, Settings},
    errors::{ExportError, ExportResult},
    services::{azure_client::UploadOptions, exporter::Exporter},
};
use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use std::sync::Arc;
use tracing::{error, info};

pub struct DataFeedPipeline {
    exporter: Arc<dyn Exporter>,
    filename: String,
    missing_container: MissingContainerPolicy,
}

impl DataFeedPipeline {
    pub fn new(
        exporter: Arc<dyn Exporter>,
        filename: impl Into<String>,
        missing_container: MissingContainerPolicy,
    ) -> Self {
        Self {
            exporter,
            filename: filename.into(),
            missing_container,
        }
    }

    /// Build from host settings. Requires `AZURE_EXPORT_FILENAME`.
    pub fn from_settings(settings: &Settings) -> ExportResult<Self> {
        let config = ExporterConfig::from_settings(settings)?;
        let filename = config
            .export_filename
            .clone()
            .ok_or_else(|| ExportError::NotConfigured(format!("set {}", EXPORT_FILENAME)))?;
        info!(
            container = %config.container,
            blob = %format!("{}{}", config.prefix, filename),
            policy = ?config.missing_container,
            "data feed exporter enabled"
        );
        Ok(Self::new(
            Arc::new(config.exporter()?),
            filename,
            config.missing_container,
        ))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Upload the feed, overwriting the previous one.
    ///
    /// Resolves to `true` once uploaded. With [`MissingContainerPolicy::Skip`]
    /// a missing container is logged and resolves to `false`; every other
    /// failure is returned.
    pub fn process_item(&self, buf: Bytes) -> BoxFuture<'static, ExportResult<bool>> {
        let upload = self
            .exporter
            .upload(&self.filename, buf, UploadOptions::default());
        let policy = self.missing_container;
        let filename = self.filename.clone();

        async move {
            match upload.await {
                Ok(_) => Ok(true),
                Err(err)
                    if policy == MissingContainerPolicy::Skip && err.is_container_not_found() =>
                {
                    error!(blob = %filename, error = %err, "container does not exist, feed not exported");
                    Ok(false)
                }
                Err(err) => Err(err),
            }
        }
        .boxed()
    }
}
