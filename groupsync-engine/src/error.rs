//! Error types for groupsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use groupsync_core::{JobKey, StoreError};

/// All errors that can arise from engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the job store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (tracker, part payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chunk size must be at least one member.
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// Chunks could not be reassembled into one snapshot.
    #[error("cannot merge chunks: {0}")]
    Merge(String),

    /// A part arrived that does not fit the job's tracker.
    #[error("part tracker for {job}: {reason}")]
    Tracker { job: JobKey, reason: String },

    /// The notification sink refused a message.
    #[error("notification failed: {0}")]
    Notification(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
