//! Blob-level HTTP content settings and the header table that feeds them.

use crate::errors::{ExportError, ExportResult};
use reqwest::header::HeaderValue;
use serde::Serialize;

/// Cache directive attached to every files-store upload unless overridden.
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=172800";

/// One of the six content settings a blob can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSetting {
    ContentType,
    CacheControl,
    ContentDisposition,
    ContentEncoding,
    ContentLanguage,
    ContentMd5,
}

static HEADER_TABLE: [(&str, ContentSetting); 6] = [
    ("Content-Type", ContentSetting::ContentType),
    ("Cache-Control", ContentSetting::CacheControl),
    ("Content-Disposition", ContentSetting::ContentDisposition),
    ("Content-Encoding", ContentSetting::ContentEncoding),
    ("Content-Language", ContentSetting::ContentLanguage),
    ("Content-MD5", ContentSetting::ContentMd5),
];

impl ContentSetting {
    /// Look up an HTTP header name, ignoring case.
    pub fn from_header(name: &str) -> Option<Self> {
        HEADER_TABLE
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name.trim()))
            .map(|(_, setting)| *setting)
    }

    /// Settings key as the Blob SDKs name it.
    pub fn key(self) -> &'static str {
        match self {
            Self::ContentType => "content_type",
            Self::CacheControl => "cache_control",
            Self::ContentDisposition => "content_disposition",
            Self::ContentEncoding => "content_encoding",
            Self::ContentLanguage => "content_language",
            Self::ContentMd5 => "content_md5",
        }
    }

    /// Request header that sets this property on Put Blob.
    pub fn request_header(self) -> &'static str {
        match self {
            Self::ContentType => "x-ms-blob-content-type",
            Self::CacheControl => "x-ms-blob-cache-control",
            Self::ContentDisposition => "x-ms-blob-content-disposition",
            Self::ContentEncoding => "x-ms-blob-content-encoding",
            Self::ContentLanguage => "x-ms-blob-content-language",
            Self::ContentMd5 => "x-ms-blob-content-md5",
        }
    }

    /// Response header the service reports this property under.
    pub fn response_header(self) -> &'static str {
        match self {
            Self::ContentType => "content-type",
            Self::CacheControl => "cache-control",
            Self::ContentDisposition => "content-disposition",
            Self::ContentEncoding => "content-encoding",
            Self::ContentLanguage => "content-language",
            Self::ContentMd5 => "content-md5",
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        HEADER_TABLE.iter().map(|(_, setting)| *setting)
    }
}

/// Content settings stored alongside a blob and replayed on download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
}

impl ContentSettings {
    /// The defaults every files-store upload starts from.
    pub fn export_defaults() -> Self {
        Self {
            cache_control: Some(DEFAULT_CACHE_CONTROL.to_string()),
            ..Self::default()
        }
    }

    pub fn get(&self, setting: ContentSetting) -> Option<&str> {
        self.slot(setting).as_deref()
    }

    pub fn set(&mut self, setting: ContentSetting, value: impl Into<String>) {
        *self.slot_mut(setting) = Some(value.into());
    }

    /// Overlay every value present in `other` onto `self`.
    pub fn merge(&mut self, other: ContentSettings) {
        for setting in ContentSetting::all() {
            if let Some(value) = other.get(setting) {
                self.set(setting, value);
            }
        }
    }

    /// `(request header, value)` pairs for the populated settings.
    pub fn request_headers(&self) -> impl Iterator<Item = (&'static str, &str)> {
        ContentSetting::all()
            .filter_map(|setting| self.get(setting).map(|v| (setting.request_header(), v)))
    }

    fn slot(&self, setting: ContentSetting) -> &Option<String> {
        match setting {
            ContentSetting::ContentType => &self.content_type,
            ContentSetting::CacheControl => &self.cache_control,
            ContentSetting::ContentDisposition => &self.content_disposition,
            ContentSetting::ContentEncoding => &self.content_encoding,
            ContentSetting::ContentLanguage => &self.content_language,
            ContentSetting::ContentMd5 => &self.content_md5,
        }
    }

    fn slot_mut(&mut self, setting: ContentSetting) -> &mut Option<String> {
        match setting {
            ContentSetting::ContentType => &mut self.content_type,
            ContentSetting::CacheControl => &mut self.cache_control,
            ContentSetting::ContentDisposition => &mut self.content_disposition,
            ContentSetting::ContentEncoding => &mut self.content_encoding,
            ContentSetting::ContentLanguage => &mut self.content_language,
            ContentSetting::ContentMd5 => &mut self.content_md5,
        }
    }
}

/// Translate HTTP headers into content settings.
///
/// Fails on the first header outside the fixed table; nothing is dropped
/// silently. A value that is not a legal header value is a `Config` error.
/// Later duplicates win.
pub fn content_settings_from_headers<I, K, V>(headers: I) -> ExportResult<ContentSettings>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut settings = ContentSettings::default();
    for (name, value) in headers {
        let name = name.as_ref();
        let setting = ContentSetting::from_header(name)
            .ok_or_else(|| ExportError::UnsupportedHeader(name.to_string()))?;
        let value = value.into();
        if HeaderValue::from_str(&value).is_err() {
            return Err(ExportError::config(format!(
                "header `{}` has a value that cannot be sent",
                name
            )));
        }
        settings.set(setting, value);
    }
    Ok(settings)
}
