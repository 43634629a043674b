//! Error types for groupsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from job store and config operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No job record exists at the expected path.
    #[error("job not found at {path}")]
    JobNotFound { path: PathBuf },

    /// A job with the same key is already registered.
    #[error("job already exists at {path}")]
    JobExists { path: PathBuf },

    /// A key segment cannot be used as a file name.
    #[error("invalid job key segment '{0}'")]
    InvalidKey(String),
}
