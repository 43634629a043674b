use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the session runtime, sync stages, and scheduling.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] groupsync_core::StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] groupsync_engine::SyncError),

    #[error("directory error: {0}")]
    Directory(#[from] groupsync_directory::DirectoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("session {session}: {reason}")]
    Session { session: String, reason: String },

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

pub(crate) fn join_err(task: &'static str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::Join {
        task,
        reason: err.to_string(),
    }
}
