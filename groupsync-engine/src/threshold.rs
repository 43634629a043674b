//! Threshold governor — the safety gate in front of every destination write.
//!
//! Decision order:
//! 1. Initial sync (job never completed a run) → approve.
//! 2. Percent change over the pre-sync destination size (floored at 1) above
//!    an enabled threshold → block.
//! 3. `ignore_threshold_once` turns one block into an approval and clears.
//! 4. Blocks increment `threshold_violations`; reaching `disable_limit`
//!    disables the job, otherwise reaching `notify_lower_bound` notifies.
//! 5. Approvals reset `threshold_violations`. Dry runs are approvals that
//!    stamp `dry_run_time_stamp` and return the job to `Idle`.

use chrono::{DateTime, Utc};

use groupsync_core::{SyncConfig, SyncJob, SyncStatus};

use crate::diff::DiffResult;
use crate::notify::{NotificationTemplate, PendingNotification};

/// Violation counts that drive escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub notify_lower_bound: u32,
    pub disable_limit: u32,
}

impl From<&SyncConfig> for ThresholdPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            notify_lower_bound: config.notify_lower_bound,
            disable_limit: config.disable_limit,
        }
    }
}

/// Dry-run requests from the three places they can come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DryRunFlags {
    pub global: bool,
    pub job: bool,
    pub source: bool,
}

impl DryRunFlags {
    pub fn any(self) -> bool {
        self.global || self.job || self.source
    }
}

/// Size of a change relative to the current destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeMagnitude {
    pub percent_add: f64,
    pub percent_remove: f64,
}

impl ChangeMagnitude {
    pub fn measure(diff: &DiffResult, destination_size: usize) -> Self {
        let divisor = destination_size.max(1) as f64;
        Self {
            percent_add: diff.to_add.len() as f64 / divisor * 100.0,
            percent_remove: diff.to_remove.len() as f64 / divisor * 100.0,
        }
    }

    fn exceeds(self, job: &SyncJob) -> bool {
        over(self.percent_add, job.threshold_percentage_for_additions)
            || over(self.percent_remove, job.threshold_percentage_for_removals)
    }
}

fn over(percent: f64, threshold: i32) -> bool {
    threshold >= 0 && percent > f64::from(threshold)
}

/// What the governor decided for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Apply the diff (or only log it, for a dry run).
    Approved { dry_run: bool, bypassed: bool },
    /// Leave the destination untouched.
    Blocked {
        notification: Option<PendingNotification>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub magnitude: ChangeMagnitude,
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self.verdict, Verdict::Blocked { .. })
    }
}

/// Evaluate `diff` for `job`, updating the job's violation bookkeeping in
/// place. The caller persists the job.
pub fn evaluate(
    job: &mut SyncJob,
    diff: &DiffResult,
    destination_size: usize,
    policy: ThresholdPolicy,
    dry_run: DryRunFlags,
    now: DateTime<Utc>,
) -> Decision {
    let magnitude = ChangeMagnitude::measure(diff, destination_size);

    let mut bypassed = false;
    if !job.is_initial_sync() && magnitude.exceeds(job) {
        if job.ignore_threshold_once {
            job.ignore_threshold_once = false;
            bypassed = true;
            tracing::info!(job = %job.key, "threshold exceeded but ignored once by request");
        } else {
            let notification = block(job, magnitude, policy);
            return Decision {
                verdict: Verdict::Blocked { notification },
                magnitude,
            };
        }
    }

    job.threshold_violations = 0;
    let is_dry_run = dry_run.any();
    if is_dry_run {
        job.dry_run_time_stamp = Some(now);
        job.status = SyncStatus::Idle;
        job.run_started_at = None;
    }

    Decision {
        verdict: Verdict::Approved {
            dry_run: is_dry_run,
            bypassed,
        },
        magnitude,
    }
}

fn block(
    job: &mut SyncJob,
    magnitude: ChangeMagnitude,
    policy: ThresholdPolicy,
) -> Option<PendingNotification> {
    job.threshold_violations = job.threshold_violations.saturating_add(1);
    job.status = SyncStatus::ThresholdExceeded;
    job.run_started_at = None;

    tracing::warn!(
        job = %job.key,
        destination = %job.destination,
        percent_add = magnitude.percent_add,
        percent_remove = magnitude.percent_remove,
        threshold_add = job.threshold_percentage_for_additions,
        threshold_remove = job.threshold_percentage_for_removals,
        violations = job.threshold_violations,
        "sync blocked by threshold",
    );

    if job.threshold_violations >= policy.disable_limit {
        job.enabled = false;
        tracing::warn!(job = %job.key, "job disabled after repeated threshold violations");
        return Some(PendingNotification {
            template: NotificationTemplate::JobDisabled,
            params: vec![
                job.destination.to_string(),
                job.key.to_string(),
                job.threshold_violations.to_string(),
                policy.disable_limit.to_string(),
            ],
        });
    }

    if job.threshold_violations >= policy.notify_lower_bound {
        return Some(PendingNotification {
            template: NotificationTemplate::ThresholdExceeded,
            params: vec![
                job.destination.to_string(),
                job.threshold_percentage_for_additions.to_string(),
                format!("{:.2}", magnitude.percent_add),
                job.threshold_percentage_for_removals.to_string(),
                format!("{:.2}", magnitude.percent_remove),
            ],
        });
    }

    None
}
