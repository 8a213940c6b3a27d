//! src/services/azure_client.rs
//!
//! AzureClient, the storage façade: one account, one container, a SAS
//! expiry policy. Every operation is a single Blob REST call authorized with
//! Shared Key; nothing is retried, cached or chunked.

use crate::{
    errors::{ExportError, ExportResult},
    models::{
        blob::{Blob, BlobProperties, UploadReceipt},
        content_settings::{ContentSetting, ContentSettings},
        credentials::StorageCredentials,
        metadata::{METADATA_HEADER_PREFIX, Metadata},
    },
    services::{
        auth::{API_VERSION, authorize, http_date},
        sas::{SignedUrlPolicy, blob_sas_query},
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{
    Method, Request, Response, StatusCode,
    header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderValue, LAST_MODIFIED},
};
use std::{io, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_BLOB_NAME_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;

/// Characters left as-is in blob URL paths: unreserved plus `/`.
const BLOB_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Content settings and metadata sent with one upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_settings: ContentSettings,
    pub metadata: Metadata,
}

/// Client bound to a single container.
///
/// Cheap to clone; clones share the HTTP connection pool and credentials.
#[derive(Clone)]
pub struct AzureClient {
    http: reqwest::Client,
    credentials: Arc<StorageCredentials>,
    container: String,
    policy: SignedUrlPolicy,
}

impl AzureClient {
    /// Create a client for `container`, validating the container name.
    pub fn new(
        credentials: StorageCredentials,
        container: impl Into<String>,
        policy: SignedUrlPolicy,
    ) -> ExportResult<Self> {
        let container = container.into();
        ensure_container_name_safe(&container)?;
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            credentials: Arc::new(credentials),
            container,
            policy,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Unsigned URL of a blob in the configured container.
    pub fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.credentials.blob_endpoint,
            self.container,
            utf8_percent_encode(name, BLOB_PATH)
        )
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.credentials.blob_endpoint, self.container)
    }

    /// Upload `data` to `name`, overwriting, and return a signed read URL.
    pub async fn upload(&self, name: &str, data: impl Into<Bytes>) -> ExportResult<String> {
        self.upload_with(name, data.into(), &UploadOptions::default())
            .await?;
        self.signed_url(name)
    }

    /// Drain `stream` and upload it to `name`, returning a signed read URL.
    ///
    /// The payload is hashed while it is collected so the service can verify
    /// it with the transactional `Content-MD5`.
    pub async fn upload_stream<S>(
        &self,
        name: &str,
        stream: S,
        options: &UploadOptions,
    ) -> ExportResult<String>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        ensure_blob_name_safe(name)?;
        let mut buffer = BytesMut::new();
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            digest.consume(&chunk);
            buffer.extend_from_slice(&chunk);
        }
        let md5 = general_purpose::STANDARD.encode(digest.compute().0);

        self.put_blob(name, buffer.freeze(), md5, options).await?;
        self.signed_url(name)
    }

    /// Upload `payload` to `name` with content settings and metadata.
    pub async fn upload_with(
        &self,
        name: &str,
        payload: Bytes,
        options: &UploadOptions,
    ) -> ExportResult<UploadReceipt> {
        ensure_blob_name_safe(name)?;
        let md5 = general_purpose::STANDARD.encode(md5::compute(&payload).0);
        self.put_blob(name, payload, md5, options).await
    }

    async fn put_blob(
        &self,
        name: &str,
        payload: Bytes,
        md5: String,
        options: &UploadOptions,
    ) -> ExportResult<UploadReceipt> {
        let size = payload.len();
        let mut builder = self
            .http
            .put(self.blob_url(name))
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_LENGTH, size)
            .header("content-md5", md5);
        for (header, value) in options.content_settings.request_headers() {
            builder = builder.header(header, value);
        }
        for (key, value) in &options.metadata {
            builder = builder.header(format!("{}{}", METADATA_HEADER_PREFIX, key), value);
        }
        let request = self.stamp(builder.body(payload).build()?);

        let response = self.send(request, &self.resource(name)).await?;
        let headers = response.headers();
        let receipt = UploadReceipt {
            name: name.to_string(),
            etag: header_str(headers, ETAG.as_str()).map(unquote),
            last_modified: header_str(headers, LAST_MODIFIED.as_str()).and_then(parse_http_date),
        };

        info!(
            container = %self.container,
            blob = %name,
            size_bytes = size,
            etag = ?receipt.etag,
            "uploaded blob"
        );
        Ok(receipt)
    }

    /// Download a blob; `None` when it does not exist.
    pub async fn get_blob(&self, name: &str) -> ExportResult<Option<Blob>> {
        ensure_blob_name_safe(name)?;
        let request = self.stamp(self.http.get(self.blob_url(name)).build()?);
        let response = match self.send(request, &self.resource(name)).await {
            Ok(response) => response,
            Err(ExportError::NotFound { .. }) => {
                debug!(blob = %name, "blob not found");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut properties = parse_properties(name, response.status(), response.headers())?;
        let content = response.bytes().await?;
        properties.content_length = content.len() as u64;
        Ok(Some(Blob::new(properties, content)))
    }

    /// Fetch blob properties without the payload; `None` when absent.
    pub async fn get_properties(&self, name: &str) -> ExportResult<Option<BlobProperties>> {
        ensure_blob_name_safe(name)?;
        let request = self.stamp(self.http.head(self.blob_url(name)).build()?);
        match self.send(request, &self.resource(name)).await {
            Ok(response) => parse_properties(name, response.status(), response.headers()).map(Some),
            Err(ExportError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Whether the configured container exists.
    pub async fn container_exists(&self) -> ExportResult<bool> {
        let request = self.stamp(
            self.http
                .head(self.container_url())
                .query(&[("restype", "container")])
                .build()?,
        );
        match self.send(request, &self.container).await {
            Ok(_) => Ok(true),
            Err(ExportError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Time-limited read URL for `name`, expiring `policy.expiry` from now.
    pub fn signed_url(&self, name: &str) -> ExportResult<String> {
        self.signed_url_at(name, Utc::now())
    }

    /// Same as [`signed_url`](Self::signed_url) with an explicit signing instant.
    pub fn signed_url_at(&self, name: &str, now: DateTime<Utc>) -> ExportResult<String> {
        let expires_at = self.policy.expires_at(now)?;
        let query = blob_sas_query(
            &self.credentials,
            &self.container,
            name,
            self.policy.permissions,
            expires_at,
        )?;
        debug!(blob = %name, %expires_at, "signed blob url");
        Ok(format!("{}?{}", self.blob_url(name), query))
    }

    /// Add the headers every Blob REST request carries.
    fn stamp(&self, mut request: Request) -> Request {
        let headers = request.headers_mut();
        let date = http_date(Utc::now());
        let request_id = Uuid::new_v4().to_string();
        for (name, value) in [
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
            ("x-ms-client-request-id", request_id.as_str()),
        ] {
            if let Ok(value) = value.parse::<HeaderValue>() {
                headers.insert(name, value);
            }
        }
        request
    }

    /// Sign and execute a request, mapping non-success statuses to errors.
    async fn send(&self, mut request: Request, resource: &str) -> ExportResult<Response> {
        authorize(&mut request, &self.credentials)?;
        let method = request.method().clone();
        debug!(%method, url = %request.url().path(), "blob request");

        let response = self.http.execute(request).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let code = header_str(response.headers(), "x-ms-error-code").map(str::to_string);
        let body = if method == Method::HEAD {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        debug!(%status, code = ?code, %resource, "blob request failed");
        Err(ExportError::from_status(status, resource, code.as_deref(), &body))
    }

    fn resource(&self, name: &str) -> String {
        format!("{}/{}", self.container, name)
    }
}

/// Blob names: 1 to 1024 characters, no control characters.
fn ensure_blob_name_safe(name: &str) -> ExportResult<()> {
    if name.is_empty() || name.len() > MAX_BLOB_NAME_LEN {
        return Err(ExportError::config(format!(
            "blob name must be 1-{} characters, got {}",
            MAX_BLOB_NAME_LEN,
            name.len()
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ExportError::config("blob name contains control characters"));
    }
    Ok(())
}

/// Validate container name format.
///
/// Azure rules:
/// - 3-63 characters
/// - lowercase letters, digits and hyphens only
/// - must start with a letter or digit
/// - no consecutive hyphens and no trailing hyphen
///
/// `$root` and `$web` are accepted as-is.
fn ensure_container_name_safe(name: &str) -> ExportResult<()> {
    if matches!(name, "$root" | "$web" | "$logs") {
        return Ok(());
    }

    let len = name.len();
    if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
        return Err(ExportError::config(format!(
            "container `{}` must be between 3 and 63 characters",
            name
        )));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(ExportError::config(format!(
            "container `{}` may only contain lowercase letters, digits and hyphens",
            name
        )));
    }

    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(ExportError::config(format!(
            "container `{}` must start and end with a letter or digit and cannot contain `--`",
            name
        )));
    }

    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn unquote(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Parse an RFC 1123 HTTP-date such as `Tue, 05 Mar 2024 07:08:09 GMT`.
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_properties(
    name: &str,
    status: StatusCode,
    headers: &HeaderMap,
) -> ExportResult<BlobProperties> {
    let missing = |what: &str| ExportError::Service {
        status,
        message: format!("response for `{}` has no usable {} header", name, what),
    };

    let etag = header_str(headers, ETAG.as_str())
        .map(unquote)
        .ok_or_else(|| missing("ETag"))?;
    let last_modified = header_str(headers, LAST_MODIFIED.as_str())
        .and_then(parse_http_date)
        .ok_or_else(|| missing("Last-Modified"))?;
    let content_length = header_str(headers, CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut content_settings = ContentSettings::default();
    for setting in ContentSetting::all() {
        if let Some(value) = header_str(headers, setting.response_header()) {
            content_settings.set(setting, value);
        }
    }

    let metadata = headers
        .iter()
        .filter_map(|(key, value)| {
            let key = key.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    Ok(BlobProperties {
        name: name.to_string(),
        etag,
        last_modified,
        content_length,
        content_settings,
        metadata,
    })
}
