//! User-defined metadata attached to uploaded blobs.

use crate::errors::{ExportError, ExportResult};
use reqwest::header::HeaderValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix the Blob service uses for user metadata headers.
pub const METADATA_HEADER_PREFIX: &str = "x-ms-meta-";

/// String-typed metadata, the only form the Blob service accepts.
pub type Metadata = BTreeMap<String, String>;

/// Coerce arbitrary item metadata into string values.
///
/// Strings are kept verbatim; numbers, booleans, arrays and objects use their
/// JSON rendering; `null` becomes `"null"`. Keys must be valid metadata names
/// (ASCII letters, digits and `_`, not starting with a digit) and are
/// lowercased, since they travel as HTTP header names and come back that way.
/// Values must be valid header values (no control characters such as `\n`).
pub fn coerce_metadata<I, K>(meta: I) -> ExportResult<Metadata>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    meta.into_iter()
        .map(|(key, value)| {
            let key = key.into();
            ensure_metadata_key(&key)?;
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            if HeaderValue::from_str(&value).is_err() {
                return Err(ExportError::config(format!(
                    "metadata `{}` has a value that cannot be sent as a header",
                    key
                )));
            }
            Ok((key.to_ascii_lowercase(), value))
        })
        .collect()
}

fn ensure_metadata_key(key: &str) -> ExportResult<()> {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ExportError::config(format!(
            "metadata key `{}` is not a valid identifier",
            key
        )));
    }
    Ok(())
}
