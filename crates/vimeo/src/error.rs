use std::path::{Path, PathBuf};

use reqwest::StatusCode;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, VimeoError>;

#[derive(Debug, thiserror::Error)]
pub enum VimeoError {
    /// An expected marker or field was missing from an upstream response body.
    #[error("unexpected upstream response from {source_url}: {reason}")]
    UpstreamParse { source_url: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("I/O error while {op} `{}`: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("multiplexer `{program}` could not be started: {reason}")]
    MultiplexerUnavailable { program: String, reason: String },

    #[error("manifest has no {track} variants")]
    NoVariants { track: &'static str },
}

impl VimeoError {
    pub fn upstream_parse(source_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamParse {
            source_url: source_url.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether re-running the same download could plausibly succeed.
    ///
    /// The pipeline itself never retries; callers use this to decide what
    /// to report.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Filesystem { .. } => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::UpstreamParse { .. }
            | Self::InvalidUrl { .. }
            | Self::MultiplexerUnavailable { .. }
            | Self::NoVariants { .. } => false,
        }
    }
}
