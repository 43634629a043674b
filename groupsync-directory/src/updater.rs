//! Concurrent directory update engine.
//!
//! A diff is partitioned into [`WorkUnit`]s and drained by a fixed pool of
//! workers. Each worker takes up to [`MAX_STEPS_PER_BATCH`] units, submits
//! them as one batch, and settles every step according to its status:
//!
//! | status                     | multi-member unit | single-member unit     |
//! |----------------------------|-------------------|------------------------|
//! | 2xx                        | success           | success                |
//! | 400 "already exist"        | demote            | `users_already_exist`  |
//! | 404 / 400 "does not exist" | demote            | `users_not_found`      |
//! | 403                        | demote            | dropped                |
//! | 429 (step or whole batch)  | pause all, requeue| pause all, requeue     |
//! | 500, 502, 503, 504         | requeue           | requeue                |
//! | anything else              | run fails, halt   | run fails, halt        |
//!
//! Requeues count against the unit's retry budget; a unit that runs out is
//! dropped and fails the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use groupsync_core::{GroupId, MemberId, SyncConfig};

use crate::api::DirectoryApi;
use crate::envelope::{BatchRequest, BatchResponse, StepResponse, MAX_STEPS_PER_BATCH};
use crate::queue::WorkQueue;
use crate::report::{UpdateReport, UpdateStatus};
use crate::throttle::ThrottleGate;
use crate::unit::{partition_additions, partition_removals, WorkUnit};
use crate::DirectoryError;

/// How one step's response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    AlreadyExists,
    NotFound,
    Forbidden,
    /// Throttled, with the directory's wait hint in seconds.
    Throttled(Option<u64>),
    Transient(u16),
    Unexpected(u16),
}

/// Map a step status (and its error message, for 400s) to an outcome.
pub fn classify(status: u16, message: Option<&str>) -> StepOutcome {
    match status {
        200..=299 => StepOutcome::Success,
        400 => {
            let message = message.unwrap_or_default().to_ascii_lowercase();
            if message.contains("already exist") {
                StepOutcome::AlreadyExists
            } else if message.contains("does not exist") {
                StepOutcome::NotFound
            } else {
                StepOutcome::Unexpected(status)
            }
        }
        403 => StepOutcome::Forbidden,
        404 => StepOutcome::NotFound,
        429 => StepOutcome::Throttled(None),
        500 | 502 | 503 | 504 => StepOutcome::Transient(status),
        _ => StepOutcome::Unexpected(status),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    pub worker_count: usize,
    pub max_retries: u32,
    /// Pause used when a throttling response carries no hint.
    pub default_throttle: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for UpdateOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            max_retries: config.max_retries,
            default_throttle: Duration::from_secs(config.default_throttle_secs),
        }
    }
}

/// Applies membership diffs to a directory through a worker pool.
pub struct DirectoryUpdater<D> {
    api: Arc<D>,
    options: UpdateOptions,
}

impl<D: DirectoryApi> DirectoryUpdater<D> {
    pub fn new(api: Arc<D>, options: UpdateOptions) -> Self {
        Self { api, options }
    }

    /// Add `to_add` to and remove `to_remove` from `group`.
    ///
    /// Per-identity failures are reported, not returned as `Err`. `Err` is
    /// reserved for a worker task that panicked.
    pub async fn apply(
        &self,
        group: &GroupId,
        to_add: &[MemberId],
        to_remove: &[MemberId],
    ) -> Result<UpdateReport, DirectoryError> {
        let mut units = partition_additions(to_add);
        units.extend(partition_removals(to_remove));
        if units.is_empty() {
            return Ok(UpdateReport::default());
        }

        let workers = self.options.worker_count.max(1).min(units.len());
        tracing::info!(
            group = %group,
            to_add = to_add.len(),
            to_remove = to_remove.len(),
            units = units.len(),
            workers,
            "starting directory update",
        );

        let shared = Arc::new(Shared {
            group: group.clone(),
            queue: WorkQueue::new(units),
            gate: ThrottleGate::new(),
            report: Mutex::new(UpdateReport::default()),
            options: self.options,
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let api = Arc::clone(&self.api);
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(worker_id, api, shared))
            })
            .collect();

        for handle in handles {
            handle
                .await
                .map_err(|e| DirectoryError::Join(e.to_string()))?;
        }

        let report = shared.report.lock().clone();
        tracing::info!(
            group = %group,
            status = %report.status,
            success = report.success_count,
            not_found = report.users_not_found.len(),
            already_exist = report.users_already_exist.len(),
            dropped = report.dropped.len(),
            batches = report.batches_sent,
            "directory update finished",
        );
        Ok(report)
    }
}

struct Shared {
    group: GroupId,
    queue: WorkQueue,
    gate: ThrottleGate,
    report: Mutex<UpdateReport>,
    options: UpdateOptions,
}

async fn worker_loop<D: DirectoryApi>(worker_id: usize, api: Arc<D>, shared: Arc<Shared>) {
    tracing::trace!(worker = worker_id, "update worker started");

    loop {
        shared.gate.wait().await;
        let Some(batch) = shared.queue.take(MAX_STEPS_PER_BATCH).await else {
            break;
        };
        // The gate may have closed while this worker was waiting for work.
        shared.gate.wait().await;

        let taken = batch.len();
        let request = BatchRequest {
            group: shared.group.clone(),
            steps: batch.iter().map(WorkUnit::to_step).collect(),
        };
        shared.report.lock().batches_sent += 1;

        let retry = match api.execute_batch(request).await {
            Ok(response) => shared.settle(batch, response),
            Err(DirectoryError::Http {
                status: 429,
                retry_after,
                ..
            }) => {
                shared.throttle(retry_after);
                let mut retry = Vec::new();
                for unit in batch {
                    shared.requeue(unit, &mut retry);
                }
                retry
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(worker = worker_id, error = %err, "batch call failed; requeueing");
                let mut retry = Vec::new();
                for unit in batch {
                    shared.requeue(unit, &mut retry);
                }
                retry
            }
            Err(err) => {
                tracing::error!(worker = worker_id, error = %err, "batch call failed");
                shared.fail();
                Vec::new()
            }
        };
        shared.queue.finish(taken, retry);
    }

    tracing::trace!(worker = worker_id, "update worker stopped");
}

impl Shared {
    fn settle(&self, batch: Vec<WorkUnit>, response: BatchResponse) -> Vec<WorkUnit> {
        let mut by_id: HashMap<String, StepResponse> = response
            .responses
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut retry = Vec::new();
        for unit in batch {
            match by_id.remove(&unit.id) {
                Some(step) => self.settle_step(unit, &step, &mut retry),
                None => {
                    tracing::warn!(unit = %unit.id, "no response for batch step; requeueing");
                    self.requeue(unit, &mut retry);
                }
            }
        }
        retry
    }

    fn settle_step(&self, unit: WorkUnit, step: &StepResponse, retry: &mut Vec<WorkUnit>) {
        let outcome = match classify(step.status, step.message.as_deref()) {
            StepOutcome::Throttled(_) => StepOutcome::Throttled(step.retry_after),
            other => other,
        };

        match outcome {
            StepOutcome::Success => self.report.lock().success_count += unit.len(),
            StepOutcome::AlreadyExists | StepOutcome::NotFound | StepOutcome::Forbidden
                if unit.len() > 1 =>
            {
                tracing::debug!(unit = %unit.id, status = step.status, members = unit.len(), "demoting to individual retries");
                retry.extend(unit.demote());
            }
            StepOutcome::AlreadyExists => {
                self.report.lock().users_already_exist.extend(unit.members);
            }
            StepOutcome::NotFound => {
                self.report.lock().users_not_found.extend(unit.members);
            }
            StepOutcome::Forbidden => {
                tracing::warn!(members = ?unit.members, "directory refused change; dropping");
                self.report.lock().dropped.extend(unit.members);
            }
            StepOutcome::Throttled(hint) => {
                self.throttle(hint);
                self.requeue(unit, retry);
            }
            StepOutcome::Transient(status) => {
                tracing::debug!(unit = %unit.id, status, "transient failure; requeueing");
                self.requeue(unit, retry);
            }
            StepOutcome::Unexpected(status) => {
                tracing::error!(
                    unit = %unit.id,
                    status,
                    message = step.message.as_deref().unwrap_or(""),
                    "unexpected directory response; halting update",
                );
                self.fail();
            }
        }
    }

    /// Close the gate for the hinted wait, or the default when there is none.
    fn throttle(&self, hint: Option<u64>) {
        let wait = hint
            .map(Duration::from_secs)
            .unwrap_or(self.options.default_throttle);
        if self.gate.trip(wait) {
            tracing::warn!(secs = wait.as_secs(), "directory throttled; pausing workers");
        }
    }

    fn requeue(&self, mut unit: WorkUnit, retry: &mut Vec<WorkUnit>) {
        if unit.record_retry(self.options.max_retries) {
            retry.push(unit);
            return;
        }
        tracing::error!(
            unit = %unit.id,
            retries = unit.retry_count - 1,
            members = unit.len(),
            "retries exhausted; halting update",
        );
        self.report.lock().dropped.extend(unit.members);
        self.fail();
    }

    fn fail(&self) {
        self.report.lock().status = UpdateStatus::Error;
        self.queue.halt();
    }
}
