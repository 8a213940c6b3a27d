use crate::{
    errors::{ExportError, ExportResult},
    models::credentials::StorageCredentials,
    services::{
        azure_client::AzureClient,
        exporter::BlobExporter,
        sas::{DEFAULT_SAS_EXPIRY_SECS, SignedUrlPolicy},
        worker_pool::{DEFAULT_WORKERS, WorkerPool},
    },
};
use clap::{Parser, Subcommand};
use std::{collections::BTreeMap, env, fmt, path::PathBuf, str::FromStr};

pub const CONNECTION_STRING: &str = "AZURE_CONNECTION_STRING";
pub const ACCOUNT_NAME: &str = "AZURE_ACCOUNT_NAME";
pub const ACCOUNT_KEY: &str = "AZURE_ACCOUNT_KEY";
pub const CONTAINER: &str = "AZURE_CONTAINER";
pub const EXPORT_URI: &str = "AZURE_EXPORT_URI";
pub const SAS_EXPIRY_SECS: &str = "AZURE_SAS_EXPIRY_SECS";
pub const EXPORT_FILENAME: &str = "AZURE_EXPORT_FILENAME";
pub const MISSING_CONTAINER: &str = "AZURE_MISSING_CONTAINER";
pub const EXPORT_WORKERS: &str = "AZURE_EXPORT_WORKERS";
pub const BLOB_ENDPOINT: &str = "AZURE_BLOB_ENDPOINT";

const KNOWN_KEYS: [&str; 10] = [
    CONNECTION_STRING,
    ACCOUNT_NAME,
    ACCOUNT_KEY,
    CONTAINER,
    EXPORT_URI,
    SAS_EXPIRY_SECS,
    EXPORT_FILENAME,
    MISSING_CONTAINER,
    EXPORT_WORKERS,
    BLOB_ENDPOINT,
];

/// Flat key/value settings, as a crawl framework hands them to its plugins.
#[derive(Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every known `AZURE_*` variable from the process environment.
    pub fn from_env() -> Self {
        KNOWN_KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (*key, value)))
            .collect()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Value for `key`; blank values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> ExportResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|err| {
                    ExportError::config(format!("parsing {} value `{}`: {}", key, value, err))
                })
            })
            .transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if key == ACCOUNT_KEY || key == CONNECTION_STRING {
                map.entry(key, &"[REDACTED]");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// `azure://{container}/{prefix}` export location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUri {
    pub container: String,
    pub prefix: String,
}

impl FromStr for ExportUri {
    type Err = ExportError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let rest = uri
            .strip_prefix("azure://")
            .ok_or_else(|| ExportError::InvalidExportUri(uri.to_string()))?;
        let (container, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if container.is_empty() {
            return Err(ExportError::InvalidExportUri(uri.to_string()));
        }
        Ok(Self {
            container: container.to_string(),
            prefix: prefix.to_string(),
        })
    }
}

/// What the data feed adapter does when the container is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingContainerPolicy {
    /// Return the `NotFound` error to the caller.
    #[default]
    Fail,
    /// Log the error and report the item as skipped.
    Skip,
}

impl FromStr for MissingContainerPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fail" | "error" => Ok(Self::Fail),
            "skip" | "ignore" => Ok(Self::Skip),
            other => Err(format!("expected `fail` or `skip`, got `{}`", other)),
        }
    }
}

/// Everything the exporter needs, resolved from [`Settings`].
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub credentials: StorageCredentials,
    pub container: String,
    pub prefix: String,
    pub sas_expiry: chrono::Duration,
    pub export_filename: Option<String>,
    pub missing_container: MissingContainerPolicy,
    pub workers: usize,
}

impl ExporterConfig {
    /// Resolve settings.
    ///
    /// Missing credentials or a missing container yield
    /// [`ExportError::NotConfigured`] so a host can disable the exporter
    /// instead of failing; malformed values are [`ExportError::Config`].
    pub fn from_settings(settings: &Settings) -> ExportResult<Self> {
        let credentials = match (
            settings.get(CONNECTION_STRING),
            settings.get(ACCOUNT_NAME),
            settings.get(ACCOUNT_KEY),
        ) {
            (Some(conn), _, _) => StorageCredentials::from_connection_string(conn)?,
            (None, Some(name), Some(key)) => StorageCredentials::from_account_key(name, key)?,
            _ => {
                return Err(ExportError::NotConfigured(format!(
                    "set {} or both {} and {}",
                    CONNECTION_STRING, ACCOUNT_NAME, ACCOUNT_KEY
                )));
            }
        };
        let credentials = match settings.get(BLOB_ENDPOINT) {
            Some(endpoint) => credentials.with_blob_endpoint(endpoint),
            None => credentials,
        };

        let (container, prefix) = match (settings.get(EXPORT_URI), settings.get(CONTAINER)) {
            (Some(uri), _) => {
                let uri: ExportUri = uri.parse()?;
                (uri.container, uri.prefix)
            }
            (None, Some(container)) => (container.to_string(), String::new()),
            (None, None) => {
                return Err(ExportError::NotConfigured(format!(
                    "set {} or {}",
                    EXPORT_URI, CONTAINER
                )));
            }
        };

        let expiry_secs = settings
            .parse::<i64>(SAS_EXPIRY_SECS)?
            .unwrap_or(DEFAULT_SAS_EXPIRY_SECS);
        let sas_expiry = SignedUrlPolicy::from_secs(expiry_secs)?.expiry;

        Ok(Self {
            credentials,
            container,
            prefix,
            sas_expiry,
            export_filename: settings.get(EXPORT_FILENAME).map(str::to_string),
            missing_container: settings
                .parse::<MissingContainerPolicy>(MISSING_CONTAINER)?
                .unwrap_or_default(),
            workers: settings
                .parse::<usize>(EXPORT_WORKERS)?
                .unwrap_or(DEFAULT_WORKERS),
        })
    }

    pub fn client(&self) -> ExportResult<AzureClient> {
        AzureClient::new(
            self.credentials.clone(),
            self.container.clone(),
            SignedUrlPolicy::new(self.sas_expiry),
        )
    }

    pub fn exporter(&self) -> ExportResult<BlobExporter> {
        Ok(BlobExporter::new(
            self.client()?,
            self.prefix.clone(),
            WorkerPool::new(self.workers),
        ))
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Export crawl output to Azure Blob Storage")]
pub struct Args {
    /// Storage connection string (overrides AZURE_CONNECTION_STRING)
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Container to export into (overrides AZURE_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Export location, azure://<container>/<prefix> (overrides AZURE_EXPORT_URI)
    #[arg(long)]
    pub export_uri: Option<String>,

    /// Lifetime of signed URLs in seconds (overrides AZURE_SAS_EXPIRY_SECS)
    #[arg(long)]
    pub sas_expiry_secs: Option<i64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Upload a file and print a signed URL for it
    Upload {
        file: PathBuf,
        /// Blob name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Content header, `Name: value` (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
        /// Metadata entry, `key=value` (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
    /// Print the checksum and last-modified time of an exported path
    Stat { path: String },
    /// Print a signed read URL for a blob
    Sign { name: String },
    /// Check that the configured container exists
    Check,
    /// Upload a feed file to the fixed export path
    Export {
        file: PathBuf,
        /// Blob file name (overrides AZURE_EXPORT_FILENAME)
        #[arg(long)]
        filename: Option<String>,
    },
}

/// Parse CLI args and merge them over the environment.
pub fn from_env_and_args() -> anyhow::Result<(Settings, Command)> {
    let args = Args::parse();
    let mut settings = Settings::from_env();

    if let Some(value) = args.connection_string {
        settings.set(CONNECTION_STRING, value);
    }
    if let Some(value) = args.container {
        settings.set(CONTAINER, value);
    }
    if let Some(value) = args.export_uri {
        settings.set(EXPORT_URI, value);
    }
    if let Some(value) = args.sas_expiry_secs {
        settings.set(SAS_EXPIRY_SECS, value.to_string());
    }
    if let Command::Export {
        filename: Some(filename),
        ..
    } = &args.command
    {
        settings.set(EXPORT_FILENAME, filename.clone());
    }

    Ok((settings, args.command))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWtleQ==";

    fn base() -> Settings {
        Settings::new()
            .with(ACCOUNT_NAME, "crawlout")
            .with(ACCOUNT_KEY, KEY)
    }

    #[test]
    fn export_uri_splits_container_and_prefix() {
        let uri: ExportUri = "azure://exports/crawls/books/".parse().unwrap();
        assert_eq!(uri.container, "exports");
        assert_eq!(uri.prefix, "crawls/books/");

        let bare: ExportUri = "azure://exports".parse().unwrap();
        assert_eq!(bare.prefix, "");
    }

    #[test]
    fn export_uri_requires_scheme() {
        assert!(matches!(
            "s3://exports/x".parse::<ExportUri>(),
            Err(ExportError::InvalidExportUri(_))
        ));
        assert!("azure:///x".parse::<ExportUri>().is_err());
    }

    #[test]
    fn missing_credentials_is_not_configured() {
        let settings = Settings::new().with(CONTAINER, "exports");
        let err = ExporterConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ExportError::NotConfigured(_)));
    }

    #[test]
    fn missing_container_is_not_configured() {
        let err = ExporterConfig::from_settings(&base()).unwrap_err();
        assert!(matches!(err, ExportError::NotConfigured(_)));
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = ExporterConfig::from_settings(&base().with(EXPORT_URI, "azure://exports/out/"))
            .unwrap();
        assert_eq!(cfg.container, "exports");
        assert_eq!(cfg.prefix, "out/");
        assert_eq!(cfg.sas_expiry, chrono::Duration::days(7));
        assert_eq!(cfg.missing_container, MissingContainerPolicy::Fail);
        assert_eq!(cfg.workers, DEFAULT_WORKERS);
        assert_eq!(cfg.export_filename, None);
    }

    #[test]
    fn connection_string_wins_over_account_pair() {
        let settings = base()
            .with(CONTAINER, "exports")
            .with(
                CONNECTION_STRING,
                format!("AccountName=other;AccountKey={}", KEY),
            );
        let cfg = ExporterConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.credentials.account_name, "other");
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let settings = base()
            .with(CONTAINER, "exports")
            .with(SAS_EXPIRY_SECS, "soon");
        assert!(matches!(
            ExporterConfig::from_settings(&settings),
            Err(ExportError::Config(_))
        ));

        let settings = base().with(CONTAINER, "exports").with(SAS_EXPIRY_SECS, "0");
        assert!(ExporterConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn oversized_sas_expiry_is_rejected() {
        for secs in ["10000000000000", "9223372036854775807", "31536001"] {
            let settings = base().with(CONTAINER, "exports").with(SAS_EXPIRY_SECS, secs);
            assert!(
                matches!(
                    ExporterConfig::from_settings(&settings),
                    Err(ExportError::Config(_))
                ),
                "{} accepted",
                secs
            );
        }

        let settings = base()
            .with(CONTAINER, "exports")
            .with(SAS_EXPIRY_SECS, "31536000");
        let cfg = ExporterConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.sas_expiry, chrono::Duration::days(365));
        assert!(cfg.client().unwrap().signed_url("a.json").is_ok());
    }

    #[test]
    fn missing_container_policy_parses() {
        let cfg = ExporterConfig::from_settings(
            &base()
                .with(CONTAINER, "exports")
                .with(MISSING_CONTAINER, "Skip"),
        )
        .unwrap();
        assert_eq!(cfg.missing_container, MissingContainerPolicy::Skip);
        assert!("maybe".parse::<MissingContainerPolicy>().is_err());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings = base().with(CONTAINER, "   ");
        assert!(matches!(
            ExporterConfig::from_settings(&settings),
            Err(ExportError::NotConfigured(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", base());
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("crawlout"));
    }
}
