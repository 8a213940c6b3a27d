//! Shared Key request signing for the Blob REST API.
//!
//! ```text
//! VERB\n
//! Content-Encoding\n Content-Language\n Content-Length\n Content-MD5\n
//! Content-Type\n Date\n If-Modified-Since\n If-Match\n If-None-Match\n
//! If-Unmodified-Since\n Range\n
//! CanonicalizedHeaders
//! CanonicalizedResource
//! ```

use crate::{
    errors::{ExportError, ExportResult},
    models::credentials::StorageCredentials,
};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use reqwest::{
    Request, Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// REST API version sent with every request and embedded in SAS tokens.
pub const API_VERSION: &str = "2021-06-08";

const STANDARD_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// HMAC-SHA256 over `string_to_sign` with the account key, base64 encoded.
pub fn compute_signature(
    credentials: &StorageCredentials,
    string_to_sign: &str,
) -> ExportResult<String> {
    let mut mac = HmacSha256::new_from_slice(credentials.key())
        .map_err(|err| ExportError::config(format!("unusable account key: {}", err)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build the Shared Key string-to-sign for a request.
pub fn string_to_sign(method: &str, url: &Url, headers: &HeaderMap, account: &str) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(&method.to_ascii_uppercase());
    out.push('\n');

    for name in STANDARD_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        // Content-Length is signed as empty when zero.
        if name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }

    let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_ascii_lowercase();
        if name.starts_with("x-ms-") {
            let value = value.to_str().unwrap_or("").trim().to_string();
            ms_headers.insert(name, value);
        }
    }
    for (name, value) in &ms_headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (key, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&key);
        out.push(':');
        out.push_str(&values.join(","));
    }

    out
}

/// Attach `Authorization: SharedKey {account}:{signature}` to a built request.
///
/// Must run after every other header is set; the signature covers them.
pub fn authorize(request: &mut Request, credentials: &StorageCredentials) -> ExportResult<()> {
    let to_sign = string_to_sign(
        request.method().as_str(),
        request.url(),
        request.headers(),
        &credentials.account_name,
    );
    let signature = compute_signature(credentials, &to_sign)?;
    let value = HeaderValue::from_str(&format!(
        "SharedKey {}:{}",
        credentials.account_name, signature
    ))
    .map_err(|err| ExportError::config(format!("invalid authorization header: {}", err)))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

/// RFC 1123 timestamp for `x-ms-date`.
pub fn http_date(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
