//! Errors for the watch cycle and its collaborators.

use std::path::PathBuf;

use harvest::FetchError;
use reconcile::ReconcileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reconciliation rejected: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid account id: {0:?}")]
    InvalidAccountId(String),

    #[error("state file {path} belongs to account {found}, expected {expected}")]
    AccountMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("credentials: {0}")]
    Credentials(String),
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
