//! Per-job YAML store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.groupsync/
//!   config.yaml
//!   jobs/
//!     <partition_key>/
//!       <row_key>.yaml       (one file per job, mode 0600)
//! ```
//!
//! Every record is replaced whole: serialize → `.yaml.tmp` sibling → `chmod
//! 0600` → `rename`. The stage currently processing a job is its only
//! writer, so no field-level locking is needed.
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::types::{JobKey, SyncJob};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.groupsync/`
pub fn groupsync_root(home: &Path) -> PathBuf {
    home.join(".groupsync")
}

/// `<home>/.groupsync/jobs/`
pub fn jobs_root(home: &Path) -> PathBuf {
    groupsync_root(home).join("jobs")
}

/// `<home>/.groupsync/jobs/<partition>/<row>.yaml` (pure, no I/O).
pub fn job_path_at(home: &Path, key: &JobKey) -> PathBuf {
    jobs_root(home)
        .join(&key.partition_key)
        .join(format!("{}.yaml", key.row_key))
}

/// Reject key segments that would escape the jobs directory.
pub fn validate_key(key: &JobKey) -> Result<(), StoreError> {
    for segment in [&key.partition_key, &key.row_key] {
        let bad = segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\']);
        if bad {
            return Err(StoreError::InvalidKey(segment.clone()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load one job record.
///
/// Returns `StoreError::JobNotFound` if absent, `StoreError::Parse` if the
/// YAML is malformed.
pub fn load_job_at(home: &Path, key: &JobKey) -> Result<SyncJob, StoreError> {
    validate_key(key)?;
    let path = job_path_at(home, key);
    if !path.exists() {
        return Err(StoreError::JobNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
}

/// `load_job_at` convenience wrapper.
pub fn load_job(key: &JobKey) -> Result<SyncJob, StoreError> {
    load_job_at(&home()?, key)
}

/// Walk `<home>/.groupsync/jobs/*/*.yaml` and return every job, sorted by key.
pub fn list_jobs_at(home: &Path) -> Result<Vec<SyncJob>, StoreError> {
    let root = jobs_root(home);
    if !root.exists() {
        return Ok(vec![]);
    }

    let mut partitions: Vec<_> = std::fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    partitions.sort_by_key(|e| e.file_name());

    let mut jobs = Vec::new();
    for partition in partitions {
        let mut files: Vec<_> = std::fs::read_dir(partition.path())?
            .filter_map(|e| e.ok())
            .collect();
        files.sort_by_key(|e| e.file_name());

        for file in files {
            let name = file.file_name();
            if !name.to_string_lossy().ends_with(".yaml") {
                continue;
            }
            let contents = std::fs::read_to_string(file.path())?;
            let job: SyncJob = serde_yaml::from_str(&contents).map_err(|source| {
                StoreError::Parse {
                    path: file.path(),
                    source,
                }
            })?;
            jobs.push(job);
        }
    }
    Ok(jobs)
}

/// `list_jobs_at` convenience wrapper.
pub fn list_jobs() -> Result<Vec<SyncJob>, StoreError> {
    list_jobs_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically replace the record for `job.key`.
pub fn save_job_at(home: &Path, job: &SyncJob) -> Result<(), StoreError> {
    validate_key(&job.key)?;
    let path = job_path_at(home, &job.key);
    let Some(dir) = path.parent() else {
        return Err(StoreError::InvalidKey(job.key.to_string()));
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        set_dir_permissions(dir)?;
    }

    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", job.key.row_key));
    let yaml = serde_yaml::to_string(job)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_job_at` convenience wrapper.
pub fn save_job(job: &SyncJob) -> Result<(), StoreError> {
    save_job_at(&home()?, job)
}

/// Register a new job. Fails with `StoreError::JobExists` if the key is taken.
pub fn create_job_at(home: &Path, job: &SyncJob) -> Result<(), StoreError> {
    validate_key(&job.key)?;
    let path = job_path_at(home, &job.key);
    if path.exists() {
        return Err(StoreError::JobExists { path });
    }
    save_job_at(home, job)
}

/// Load, mutate and save a job in one step.
pub fn update_job_at<F>(home: &Path, key: &JobKey, mutate: F) -> Result<SyncJob, StoreError>
where
    F: FnOnce(&mut SyncJob),
{
    let mut job = load_job_at(home, key)?;
    mutate(&mut job);
    save_job_at(home, &job)?;
    Ok(job)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupId, SyncStatus};
    use tempfile::TempDir;

    fn key() -> JobKey {
        JobKey::new("contoso", "sales-team")
    }

    fn job() -> SyncJob {
        SyncJob::new(key(), GroupId::from("g-sales"))
    }

    #[test]
    fn job_path_is_correct() {
        let home = TempDir::new().unwrap();
        let path = job_path_at(home.path(), &key());
        assert!(path.ends_with(".groupsync/jobs/contoso/sales-team.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = TempDir::new().unwrap();
        save_job_at(home.path(), &job()).expect("save");
        let loaded = load_job_at(home.path(), &key()).expect("load");
        assert_eq!(loaded, job());
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = TempDir::new().unwrap();
        save_job_at(home.path(), &job()).expect("save");
        let tmp = job_path_at(home.path(), &key()).with_file_name("sales-team.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn create_twice_is_rejected() {
        let home = TempDir::new().unwrap();
        create_job_at(home.path(), &job()).expect("create");
        let err = create_job_at(home.path(), &job()).unwrap_err();
        assert!(matches!(err, StoreError::JobExists { .. }));
    }

    #[test]
    fn update_replaces_whole_record() {
        let home = TempDir::new().unwrap();
        save_job_at(home.path(), &job()).expect("save");
        let updated = update_job_at(home.path(), &key(), |j| {
            j.status = SyncStatus::InProgress;
            j.threshold_violations = 2;
        })
        .expect("update");
        assert_eq!(updated.status, SyncStatus::InProgress);
        let reloaded = load_job_at(home.path(), &key()).expect("load");
        assert_eq!(reloaded.threshold_violations, 2);
    }

    #[test]
    fn path_traversal_keys_are_rejected() {
        let home = TempDir::new().unwrap();
        let bad = SyncJob::new(JobKey::new("..", "x"), GroupId::from("g"));
        assert!(matches!(
            save_job_at(home.path(), &bad),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn list_is_empty_without_jobs_dir() {
        let home = TempDir::new().unwrap();
        assert!(list_jobs_at(home.path()).unwrap().is_empty());
    }
}
