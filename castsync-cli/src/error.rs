//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;
use vimeo_engine::VimeoError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Vimeo(#[from] VimeoError),

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download of {url} failed with HTTP {status}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("I/O error while {op} `{}`: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog `{}`: {source}", .path.display())]
    Catalog {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Episode {episode} cannot be downloaded: {reason}")]
    Episode { episode: String, reason: String },
}

impl AppError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn episode(episode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Episode {
            episode: episode.into(),
            reason: reason.into(),
        }
    }

    /// Failures worth another attempt of the same transfer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::Vimeo(e) => e.is_retryable(),
            Self::Io { .. } | Self::Catalog { .. } | Self::Configuration(_) | Self::Episode { .. } => {
                false
            }
        }
    }
}
