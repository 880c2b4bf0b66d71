//! Errors from loading relay settings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting the relay cannot run with.
    #[error("invalid {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to parse {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Home directory not found, or similar.
    #[error("path error: {0}")]
    Path(String),
}

impl CoreError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
