//! Adapters at the crawl-framework boundary.
//!
//! - [`files_store::BlobStorePipeline`]: per-file uploads under a prefix plus
//!   the `stat_file` probe used for incremental exports.
//! - [`datafeed::DataFeedPipeline`]: a whole feed written to one fixed blob.
//!
//! Both are thin: configuration comes from [`Settings`](crate::config::Settings)
//! and every storage call goes through an [`Exporter`](crate::services::exporter::Exporter).

pub mod datafeed;
pub mod files_store;

/// What the host framework tells an adapter about the running crawl.
#[derive(Debug, Clone, Default)]
pub struct SpiderInfo {
    pub spider: String,
}

impl SpiderInfo {
    pub fn new(spider: impl Into<String>) -> Self {
        Self {
            spider: spider.into(),
        }
    }
}
