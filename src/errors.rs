use reqwest::StatusCode;
use std::io;
use thiserror::Error;

/// Every failure the exporter can surface to its caller.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Settings are present but unusable (bad key, bad number, bad endpoint).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No credentials at all. Host frameworks treat this as "plugin disabled".
    #[error("azure exporter not configured: {0}")]
    NotConfigured(String),

    #[error("export uri `{0}` must look like azure://<container>/<prefix>")]
    InvalidExportUri(String),

    #[error("header `{0}` is not supported by Azure")]
    UnsupportedHeader(String),

    #[error("authorization rejected ({status}): {message}")]
    Auth { status: StatusCode, message: String },

    #[error("`{resource}` not found: {message}")]
    NotFound { resource: String, message: String },

    /// Network-level failure talking to the Blob endpoint.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    #[error("storage service returned {status}: {message}")]
    Service { status: StatusCode, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("export task failed: {0}")]
    Worker(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

impl From<reqwest::Error> for ExportError {
    /// Requests that never left the process (bad header value, bad URL) are
    /// configuration problems, not transport failures.
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Config(format!("invalid request: {}", err))
        } else {
            Self::Transport(err)
        }
    }
}

impl ExportError {
    /// Shortcut for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify a non-success response from the Blob service.
    ///
    /// `error_code` is the `x-ms-error-code` header when the service sent one.
    pub fn from_status(
        status: StatusCode,
        resource: &str,
        error_code: Option<&str>,
        body: &str,
    ) -> Self {
        let message = match (error_code, body.trim()) {
            (Some(code), "") => code.to_string(),
            (Some(code), body) => format!("{}: {}", code, body),
            (None, "") => status.canonical_reason().unwrap_or("no body").to_string(),
            (None, body) => body.to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth { status, message },
            StatusCode::NOT_FOUND => Self::NotFound {
                resource: resource.to_string(),
                message,
            },
            _ => Self::Service { status, message },
        }
    }

    /// True when the container (not just the blob) is missing.
    pub fn is_container_not_found(&self) -> bool {
        matches!(self, Self::NotFound { message, .. } if message.starts_with("ContainerNotFound"))
    }
}
