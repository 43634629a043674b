//! Sync stage: turns a collected snapshot into a governed directory update.
//!
//! Single-part snapshots are synced directly. Parts of a multi-part job are
//! recorded in the part tracker under the job's lock; the last part to
//! arrive aggregates all of them and runs the sync.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use groupsync_core::{
    store, GroupId, JobKey, MemberId, MembershipSnapshot, StoreError, SyncConfig, SyncStatus,
};
use groupsync_directory::{
    fetch_all_members, DirectoryApi, DirectoryUpdater, UpdateOptions, UpdateReport,
};
use groupsync_engine::{
    notify,
    pipeline::{self, RunOutcome, SyncPlan},
    tracker::{self, TrackerProgress},
    Notifier,
};

use crate::error::{join_err, DaemonError};
use crate::locks::KeyedLocks;

/// Downstream consumer of collected snapshots.
pub trait SnapshotSink: Send + Sync + 'static {
    fn handle(
        &self,
        snapshot: MembershipSnapshot,
    ) -> impl Future<Output = Result<StageOutcome, DaemonError>> + Send;
}

/// What happened to one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Diff applied; the report says how it went.
    Applied(UpdateReport),
    /// Diff computed and logged only.
    DryRun { to_add: usize, to_remove: usize },
    /// Threshold governor refused the change.
    Blocked,
    /// Part stored; waiting for the rest.
    PartPending { completed: usize, total: usize },
    /// No job record for the snapshot.
    JobNotFound,
    /// The job is disabled; nothing was diffed.
    JobDisabled,
    /// Destination group missing; job disabled.
    DestinationGroupNotFound,
    /// The snapshot could not be assembled.
    Rejected(String),
}

pub struct SyncStage<D, N> {
    home: PathBuf,
    config: SyncConfig,
    directory: Arc<D>,
    notifier: Arc<N>,
    locks: KeyedLocks<JobKey>,
}

impl<D: DirectoryApi, N: Notifier + 'static> SyncStage<D, N> {
    pub fn new(home: PathBuf, config: SyncConfig, directory: Arc<D>, notifier: Arc<N>) -> Self {
        Self {
            home,
            config,
            directory,
            notifier,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn process(&self, snapshot: MembershipSnapshot) -> Result<StageOutcome, DaemonError> {
        if snapshot.part.is_multi_part() {
            return self.process_part(snapshot).await;
        }
        let key = snapshot.job.clone();
        let dry_run = snapshot.dry_run;
        self.sync(&key, &snapshot.destination, snapshot.member_ids(), None, dry_run)
            .await
    }

    async fn process_part(&self, snapshot: MembershipSnapshot) -> Result<StageOutcome, DaemonError> {
        let key = snapshot.job.clone();
        let destination = snapshot.destination.clone();
        let dry_run = snapshot.dry_run;
        let _guard = self.locks.lock(&key).await;

        let home = self.home.clone();
        let progress = tokio::task::spawn_blocking(move || tracker::record_part_at(&home, &snapshot))
            .await
            .map_err(|e| join_err("record_part", e))??;

        let state = match progress {
            TrackerProgress::Pending { completed, total } => {
                tracing::info!(job = %key, completed, total, "part recorded, waiting for more");
                return Ok(StageOutcome::PartPending { completed, total });
            }
            TrackerProgress::Complete(state) => state,
        };

        let home = self.home.clone();
        let parts_key = key.clone();
        let parts = tokio::task::spawn_blocking(move || tracker::aggregate_at(&home, &parts_key, &state))
            .await
            .map_err(|e| join_err("aggregate_parts", e))??;
        tracing::info!(
            job = %key,
            source = parts.source.len(),
            baseline = parts.destination.as_ref().map(Vec::len),
            "all parts received",
        );

        let outcome = self
            .sync(&key, &destination, parts.source, parts.destination, dry_run)
            .await?;
        tracker::delete_at(&self.home, &key)?;
        Ok(outcome)
    }

    async fn sync(
        &self,
        key: &JobKey,
        snapshot_destination: &GroupId,
        source: Vec<MemberId>,
        baseline: Option<Vec<MemberId>>,
        source_dry_run: bool,
    ) -> Result<StageOutcome, DaemonError> {
        let job = match store::load_job_at(&self.home, key) {
            Ok(job) => job,
            Err(StoreError::JobNotFound { .. }) => {
                tracing::error!(job = %key, "no job record for snapshot");
                return Ok(StageOutcome::JobNotFound);
            }
            Err(err) => return Err(err.into()),
        };
        if !job.enabled {
            tracing::warn!(job = %key, status = %job.status, "job is disabled; ignoring snapshot");
            return Ok(StageOutcome::JobDisabled);
        }
        if &job.destination != snapshot_destination {
            tracing::warn!(
                job = %key,
                job_destination = %job.destination,
                snapshot_destination = %snapshot_destination,
                "snapshot names a different destination; using the job's",
            );
        }

        if !self.directory.group_exists(&job.destination).await? {
            pipeline::mark_fault_at(&self.home, key, SyncStatus::DestinationGroupNotFound, true)?;
            return Ok(StageOutcome::DestinationGroupNotFound);
        }

        let destination = match baseline {
            Some(members) => members,
            None => {
                fetch_all_members(&*self.directory, &job.destination, self.config.page_size).await?
            }
        };

        let home = self.home.clone();
        let config = self.config.clone();
        let plan_key = key.clone();
        let plan = tokio::task::spawn_blocking(move || {
            pipeline::plan_at(
                &home,
                &config,
                &plan_key,
                &source,
                &destination,
                source_dry_run,
                Utc::now(),
            )
        })
        .await
        .map_err(|e| join_err("plan", e))??;

        match plan {
            SyncPlan::DryRun { diff, .. } => Ok(StageOutcome::DryRun {
                to_add: diff.to_add.len(),
                to_remove: diff.to_remove.len(),
            }),
            SyncPlan::Blocked {
                job, notification, ..
            } => {
                if let Some(pending) = notification {
                    let owners = match self.directory.group_owners(&job.destination).await {
                        Ok(owners) => Some(owners),
                        Err(err) => {
                            tracing::warn!(job = %key, error = %err, "could not resolve group owners");
                            None
                        }
                    };
                    // Violations are already persisted, so a failed send is logged, not returned.
                    if let Err(err) = notify::deliver(
                        self.notifier.as_ref(),
                        &pending,
                        owners.as_deref(),
                        &job,
                        &self.config,
                    ) {
                        tracing::error!(
                            job = %key,
                            template = ?pending.template,
                            error = %err,
                            "notification failed",
                        );
                    }
                }
                Ok(StageOutcome::Blocked)
            }
            SyncPlan::Apply { job, diff } => {
                let updater = DirectoryUpdater::new(
                    Arc::clone(&self.directory),
                    UpdateOptions::from(&self.config),
                );
                let report = updater
                    .apply(&job.destination, &diff.to_add, &diff.to_remove)
                    .await?;
                let outcome = if report.is_ok() {
                    RunOutcome::Succeeded
                } else {
                    RunOutcome::Failed
                };
                pipeline::finish_at(&self.home, key, outcome, Utc::now())?;
                Ok(StageOutcome::Applied(report))
            }
        }
    }
}

impl<D: DirectoryApi, N: Notifier + 'static> SnapshotSink for SyncStage<D, N> {
    async fn handle(&self, snapshot: MembershipSnapshot) -> Result<StageOutcome, DaemonError> {
        self.process(snapshot).await
    }
}
