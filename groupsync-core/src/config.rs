//! Runtime configuration loaded from `<home>/.groupsync/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::groupsync_root;

/// Tunables shared by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum members per transport chunk.
    pub chunk_size: usize,
    /// Concurrent workers draining the directory update queue.
    pub worker_count: usize,
    /// Requeues allowed per work unit before it is dropped.
    pub max_retries: u32,
    /// Throttle wait used when the directory sends no retry hint.
    pub default_throttle_secs: u64,
    /// Violations at which "threshold exceeded" notifications start.
    pub notify_lower_bound: u32,
    /// Violations at which the job is disabled.
    pub disable_limit: u32,
    /// InProgress runs older than this are flagged as stuck.
    pub stuck_in_progress_hours: u32,
    /// Global dry run: compute and log diffs, never mutate.
    pub dry_run: bool,
    /// Last-resort notification recipient.
    pub support_address: Option<String>,
    /// Members requested per directory page.
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            worker_count: 10,
            max_retries: 5,
            default_throttle_secs: 150,
            notify_lower_bound: 3,
            disable_limit: 10,
            stuck_in_progress_hours: 12,
            dry_run: false,
            support_address: None,
            page_size: 999,
        }
    }
}

/// `<home>/.groupsync/config.yaml` (pure, no I/O).
pub fn config_path_at(home: &Path) -> PathBuf {
    groupsync_root(home).join("config.yaml")
}

/// Load the config, falling back to defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<SyncConfig, StoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_missing() {
        let home = TempDir::new().unwrap();
        let config = load_at(home.path()).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.default_throttle_secs, 150);
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let home = TempDir::new().unwrap();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "chunk_size: 50\ndry_run: true\n").unwrap();

        let config = load_at(home.path()).unwrap();
        assert_eq!(config.chunk_size, 50);
        assert!(config.dry_run);
        assert_eq!(config.disable_limit, 10);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "chunk_size: [oops").unwrap();

        let err = load_at(home.path()).unwrap_err();
        assert!(err.to_string().contains("config.yaml"), "got: {err}");
    }
}
