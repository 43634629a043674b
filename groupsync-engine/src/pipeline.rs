//! Per-run sync planning and job bookkeeping shared by the daemon stages and
//! the CLI.
//!
//! [`plan_at`] turns a collected source list and the current destination into
//! a governed [`SyncPlan`] and persists the governor's bookkeeping.
//! [`finish_at`] records the outcome once the directory update has run.

use std::path::Path;

use chrono::{DateTime, Utc};

use groupsync_core::{store, JobKey, MemberId, SyncConfig, SyncJob, SyncStatus};

use crate::diff::{diff, DiffResult};
use crate::notify::PendingNotification;
use crate::threshold::{evaluate, DryRunFlags, ThresholdPolicy, Verdict};
use crate::SyncError;

/// What to do with the destination for this run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPlan {
    /// Apply `diff` to the destination.
    Apply { job: SyncJob, diff: DiffResult },
    /// Diff computed and logged; destination left alone.
    DryRun { job: SyncJob, diff: DiffResult },
    /// Change too large; destination left alone.
    Blocked {
        job: SyncJob,
        diff: DiffResult,
        notification: Option<PendingNotification>,
    },
}

impl SyncPlan {
    pub fn job(&self) -> &SyncJob {
        match self {
            SyncPlan::Apply { job, .. }
            | SyncPlan::DryRun { job, .. }
            | SyncPlan::Blocked { job, .. } => job,
        }
    }

    pub fn diff(&self) -> &DiffResult {
        match self {
            SyncPlan::Apply { diff, .. }
            | SyncPlan::DryRun { diff, .. }
            | SyncPlan::Blocked { diff, .. } => diff,
        }
    }
}

/// Final outcome of the destination update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Diff `source` against `destination`, run the threshold governor, and save
/// the job's updated bookkeeping.
pub fn plan_at(
    home: &Path,
    config: &SyncConfig,
    key: &JobKey,
    source: &[MemberId],
    destination: &[MemberId],
    source_dry_run: bool,
    now: DateTime<Utc>,
) -> Result<SyncPlan, SyncError> {
    let mut job = store::load_job_at(home, key)?;
    let delta = diff(source, destination);
    let flags = DryRunFlags {
        global: config.dry_run,
        job: job.is_dry_run_enabled,
        source: source_dry_run,
    };

    let decision = evaluate(
        &mut job,
        &delta,
        destination.len(),
        ThresholdPolicy::from(config),
        flags,
        now,
    );
    store::save_job_at(home, &job)?;

    tracing::info!(
        job = %key,
        source = source.len(),
        destination = destination.len(),
        to_add = delta.to_add.len(),
        to_remove = delta.to_remove.len(),
        percent_add = decision.magnitude.percent_add,
        percent_remove = decision.magnitude.percent_remove,
        "computed membership diff",
    );

    let plan = match decision.verdict {
        Verdict::Approved { dry_run: true, .. } => {
            tracing::info!(
                job = %key,
                would_add = ?preview(&delta.to_add),
                would_remove = ?preview(&delta.to_remove),
                "[dry-run] destination left unchanged",
            );
            SyncPlan::DryRun { job, diff: delta }
        }
        Verdict::Approved { .. } => SyncPlan::Apply { job, diff: delta },
        Verdict::Blocked { notification } => SyncPlan::Blocked {
            job,
            diff: delta,
            notification,
        },
    };
    Ok(plan)
}

/// Record the end of an applied run.
///
/// Success returns the job to `Idle` and advances both run timestamps;
/// failure sets `Error` and leaves them where they were.
pub fn finish_at(
    home: &Path,
    key: &JobKey,
    outcome: RunOutcome,
    now: DateTime<Utc>,
) -> Result<SyncJob, SyncError> {
    let job = store::update_job_at(home, key, |job| {
        job.run_started_at = None;
        match outcome {
            RunOutcome::Succeeded => {
                job.status = SyncStatus::Idle;
                job.last_run_time = Some(now);
                job.last_successful_run_time = Some(now);
            }
            RunOutcome::Failed => job.status = SyncStatus::Error,
        }
    })?;
    tracing::info!(job = %key, status = %job.status, "run finished");
    Ok(job)
}

/// Record a structural fault that ends the run without touching the
/// destination.
pub fn mark_fault_at(
    home: &Path,
    key: &JobKey,
    status: SyncStatus,
    disable: bool,
) -> Result<SyncJob, SyncError> {
    let job = store::update_job_at(home, key, |job| {
        job.status = status;
        job.run_started_at = None;
        if disable {
            job.enabled = false;
        }
    })?;
    tracing::error!(job = %key, status = %status, disabled = disable, "run ended by structural fault");
    Ok(job)
}

fn preview(ids: &[MemberId]) -> Vec<&str> {
    ids.iter().take(5).map(|id| id.0.as_str()).collect()
}
