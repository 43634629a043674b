use std::path::PathBuf;

use thiserror::Error;

/// Error surface for directory clients and the update engine.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
        /// `Retry-After` seconds, when the server sent one.
        retry_after: Option<u64>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("worker task failed: {0}")]
    Join(String),
}

impl DirectoryError {
    /// Faults worth retrying: the call may or may not have been applied, and
    /// every mutation is idempotent per identity.
    pub fn is_transient(&self) -> bool {
        match self {
            DirectoryError::Transport(_) => true,
            DirectoryError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DirectoryError {
    DirectoryError::Io {
        path: path.into(),
        source,
    }
}
