//! Flags runs that stayed `InProgress` too long.
//!
//! First sweep past the bound: `InProgress → StuckInProgress`. A job still
//! stuck on the next sweep becomes `ErroredDueToStuckInProgress`.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use groupsync_core::{store, JobKey, SyncConfig, SyncJob, SyncStatus};

use crate::DaemonError;

/// Status transition applied by one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub job: JobKey,
    pub from: SyncStatus,
    pub to: SyncStatus,
}

/// Next status for `job`, if the sweep should change it.
pub fn next_status(job: &SyncJob, bound: Duration, now: DateTime<Utc>) -> Option<SyncStatus> {
    match job.status {
        SyncStatus::InProgress => {
            let started = job.run_started_at?;
            (now - started > bound).then_some(SyncStatus::StuckInProgress)
        }
        SyncStatus::StuckInProgress => Some(SyncStatus::ErroredDueToStuckInProgress),
        _ => None,
    }
}

pub fn sweep_at(
    home: &Path,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Transition>, DaemonError> {
    let bound = Duration::hours(i64::from(config.stuck_in_progress_hours));
    let mut transitions = Vec::new();

    for job in store::list_jobs_at(home)? {
        let Some(to) = next_status(&job, bound, now) else {
            continue;
        };
        store::update_job_at(home, &job.key, |j| {
            j.status = to;
            if to == SyncStatus::ErroredDueToStuckInProgress {
                j.run_started_at = None;
            }
        })?;
        tracing::warn!(job = %job.key, from = %job.status, to = %to, "watchdog moved job");
        transitions.push(Transition {
            job: job.key,
            from: job.status,
            to,
        });
    }
    Ok(transitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupsync_core::GroupId;
    use tempfile::TempDir;

    fn in_progress(started: DateTime<Utc>) -> SyncJob {
        let mut job = SyncJob::new(JobKey::new("p", "r"), GroupId::from("g"));
        job.status = SyncStatus::InProgress;
        job.run_started_at = Some(started);
        job
    }

    #[test]
    fn recent_run_is_left_alone() {
        let now = Utc::now();
        let job = in_progress(now - Duration::hours(1));
        assert_eq!(next_status(&job, Duration::hours(12), now), None);
    }

    #[test]
    fn stale_run_escalates_over_two_sweeps() {
        let home = TempDir::new().unwrap();
        let now = Utc::now();
        store::save_job_at(home.path(), &in_progress(now - Duration::hours(13))).unwrap();
        let config = SyncConfig::default();

        let first = sweep_at(home.path(), &config, now).unwrap();
        assert_eq!(first[0].to, SyncStatus::StuckInProgress);

        let second = sweep_at(home.path(), &config, now).unwrap();
        assert_eq!(second[0].to, SyncStatus::ErroredDueToStuckInProgress);

        let job = store::load_job_at(home.path(), &JobKey::new("p", "r")).unwrap();
        assert_eq!(job.status, SyncStatus::ErroredDueToStuckInProgress);
        assert!(job.run_started_at.is_none());

        assert!(sweep_at(home.path(), &config, now).unwrap().is_empty());
    }
}
