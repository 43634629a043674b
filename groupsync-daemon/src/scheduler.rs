//! Picks jobs that are due and opens a run for each.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use groupsync_core::{store, JobKey, RunId, SyncJob, SyncStatus};

use crate::DaemonError;

/// A job is due when it is enabled, in a schedulable status, and its period
/// has elapsed since the last completed run. Jobs that never ran are due.
pub fn is_due(job: &SyncJob, now: DateTime<Utc>) -> bool {
    if !job.enabled || !job.status.is_schedulable() {
        return false;
    }
    match job.last_run_time {
        None => true,
        Some(last) => last + Duration::hours(i64::from(job.period_hours)) <= now,
    }
}

/// Move `key` to `InProgress` under a fresh run id.
pub fn begin_run_at(home: &Path, key: &JobKey, now: DateTime<Utc>) -> Result<SyncJob, DaemonError> {
    let job = store::update_job_at(home, key, |job| {
        job.status = SyncStatus::InProgress;
        job.run_id = Some(RunId::new());
        job.run_started_at = Some(now);
    })?;
    tracing::info!(
        job = %key,
        run = %job.run_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        "run started",
    );
    Ok(job)
}

/// Start a run for every due job; returns the started jobs.
pub fn schedule_at(home: &Path, now: DateTime<Utc>) -> Result<Vec<SyncJob>, DaemonError> {
    let mut started = Vec::new();
    for job in store::list_jobs_at(home)? {
        if is_due(&job, now) {
            started.push(begin_run_at(home, &job.key, now)?);
        }
    }
    tracing::debug!(started = started.len(), "schedule pass complete");
    Ok(started)
}
