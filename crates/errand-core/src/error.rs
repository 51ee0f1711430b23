//! Error types for the task store and calendar contracts.
//!
//! The CLI layer wraps these in `anyhow` with context; library callers can
//! match on the variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid task: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Remote backend failure: transport, auth, or an unexpected response.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    /// Local backend failure: reading, decoding, or writing the task file.
    #[error("failed to persist tasks at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("calendar request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("calendar rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("calendar response missing {0}")]
    Decode(&'static str),

    #[error("calendar not configured: {0}")]
    Config(String),
}

pub type CalendarResult<T> = std::result::Result<T, CalendarError>;
