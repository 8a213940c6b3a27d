use anyhow::{Context, Result, bail};
use azure_blob_exporter::{
    Exporter, ExporterConfig, UploadOptions,
    config::{self, Command},
    models::{content_settings::content_settings_from_headers, metadata::coerce_metadata},
    pipelines::datafeed::DataFeedPipeline,
};
use bytes::Bytes;
use serde_json::Value;
use std::path::Path;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + command ---
    let (settings, command) = config::from_env_and_args()?;
    tracing::debug!("Resolved settings: {:?}", settings);

    let cfg = ExporterConfig::from_settings(&settings).context("loading exporter settings")?;
    tracing::info!(
        account = %cfg.credentials.account_name,
        container = %cfg.container,
        prefix = %cfg.prefix,
        "Starting azure-export"
    );

    match command {
        Command::Upload {
            file,
            name,
            headers,
            metadata,
        } => {
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let options = upload_options(&headers, &metadata)?;
            let client = cfg.client()?;
            let stream = ReaderStream::new(
                File::open(&file)
                    .await
                    .with_context(|| format!("opening {}", file.display()))?,
            );
            let blob_name = format!("{}{}", cfg.prefix, name);
            let url = client.upload_stream(&blob_name, stream, &options).await?;
            println!("{}", url);
        }
        Command::Stat { path } => {
            let exporter = cfg.exporter()?;
            let stat = exporter.probe(&path).await?;
            println!("{}", serde_json::to_string_pretty(&stat)?);
        }
        Command::Sign { name } => {
            let client = cfg.client()?;
            println!("{}", client.signed_url(&format!("{}{}", cfg.prefix, name))?);
        }
        Command::Check => {
            let client = cfg.client()?;
            if !client.container_exists().await? {
                bail!("container `{}` does not exist", client.container());
            }
            tracing::info!("Container {} is reachable", client.container());
            println!("ok");
        }
        Command::Export { file, .. } => {
            let pipeline = DataFeedPipeline::from_settings(&settings)?;
            let payload = Bytes::from(
                fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
            );
            if pipeline.process_item(payload).await? {
                println!("exported {}", pipeline.filename());
            } else {
                tracing::warn!("Feed {} was not exported", pipeline.filename());
            }
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

/// Parse `--header Name: value` and `--meta key=value` flags.
fn upload_options(headers: &[String], metadata: &[String]) -> Result<UploadOptions> {
    let headers = headers
        .iter()
        .map(|raw| {
            raw.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("header `{}` is not `Name: value`", raw))
        })
        .collect::<Result<Vec<_>>>()?;
    let metadata = metadata
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), Value::String(v.to_string())))
                .with_context(|| format!("metadata `{}` is not `key=value`", raw))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(UploadOptions {
        content_settings: content_settings_from_headers(headers)?,
        metadata: coerce_metadata(metadata)?,
    })
}
