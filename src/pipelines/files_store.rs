//! Files-store adapter: one blob per exported file.

use crate::{
    config::{ExporterConfig, Settings},
    errors::ExportResult,
    models::{
        blob::{FileStat, UploadReceipt},
        content_settings::{ContentSettings, content_settings_from_headers},
        metadata::coerce_metadata,
    },
    pipelines::SpiderInfo,
    services::{azure_client::UploadOptions, exporter::Exporter},
};
use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

pub struct BlobStorePipeline {
    exporter: Arc<dyn Exporter>,
    defaults: ContentSettings,
}

impl BlobStorePipeline {
    pub fn new(exporter: Arc<dyn Exporter>) -> Self {
        Self {
            exporter,
            defaults: ContentSettings::export_defaults(),
        }
    }

    /// Build from host settings; `NotConfigured` means "leave the plugin off".
    pub fn from_settings(settings: &Settings) -> ExportResult<Self> {
        let config = ExporterConfig::from_settings(settings)?;
        info!(
            container = %config.container,
            prefix = %config.prefix,
            workers = config.workers,
            "files store exporter enabled"
        );
        Ok(Self::new(Arc::new(config.exporter()?)))
    }

    /// Checksum and modification time of a previously exported file, if any.
    pub fn stat_file(
        &self,
        path: &str,
        info: &SpiderInfo,
    ) -> BoxFuture<'static, ExportResult<Option<FileStat>>> {
        debug!(spider = %info.spider, %path, "stat file");
        self.exporter.probe(path)
    }

    /// Upload one exported file.
    ///
    /// `headers` overlay the default content settings; an unsupported header
    /// fails the call before anything is sent. Metadata values are coerced
    /// to strings.
    pub fn process_item(
        &self,
        path: &str,
        buf: Bytes,
        info: &SpiderInfo,
        meta: Option<Map<String, Value>>,
        headers: Option<&BTreeMap<String, String>>,
    ) -> BoxFuture<'static, ExportResult<UploadReceipt>> {
        let options = match self.upload_options(meta, headers) {
            Ok(options) => options,
            Err(err) => return futures::future::ready(Err(err)).boxed(),
        };
        debug!(spider = %info.spider, %path, size_bytes = buf.len(), "export file");
        self.exporter.upload(path, buf, options)
    }

    fn upload_options(
        &self,
        meta: Option<Map<String, Value>>,
        headers: Option<&BTreeMap<String, String>>,
    ) -> ExportResult<UploadOptions> {
        let mut content_settings = self.defaults.clone();
        if let Some(headers) = headers {
            content_settings.merge(content_settings_from_headers(
                headers.iter().map(|(k, v)| (k, v.clone())),
            )?);
        }
        let metadata = coerce_metadata(meta.unwrap_or_default())?;

        Ok(UploadOptions {
            content_settings,
            metadata,
        })
    }
}
