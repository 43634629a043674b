//! Shared work queue for the update workers.
//!
//! Units leave the queue in batches and come back through [`WorkQueue::finish`]
//! when they need another attempt. The queue is drained once nothing is
//! pending and nothing is in flight, or when it has been halted.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::unit::WorkUnit;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<WorkUnit>,
    in_flight: usize,
    halted: bool,
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl WorkQueue {
    pub fn new(units: impl IntoIterator<Item = WorkUnit>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: units.into_iter().collect(),
                ..QueueState::default()
            }),
            changed: Notify::new(),
        }
    }

    /// Take up to `max` units. Waits while other workers still hold units
    /// that may be requeued; returns `None` once the queue is drained or
    /// halted.
    pub async fn take(&self, max: usize) -> Option<Vec<WorkUnit>> {
        loop {
            // Registered before inspecting state so a concurrent `finish`
            // cannot slip between the check and the wait.
            let changed = self.changed.notified();
            {
                let mut state = self.state.lock();
                if state.halted {
                    return None;
                }
                if !state.pending.is_empty() {
                    let n = max.min(state.pending.len());
                    let batch: Vec<WorkUnit> = state.pending.drain(..n).collect();
                    state.in_flight += batch.len();
                    return Some(batch);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }
            changed.await;
        }
    }

    /// Return `taken` in-flight units, requeueing `retry` at the back.
    pub fn finish(&self, taken: usize, retry: Vec<WorkUnit>) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(taken);
            if !state.halted {
                state.pending.extend(retry);
            }
        }
        self.changed.notify_waiters();
    }

    /// Stop handing out work. Units still pending are discarded.
    pub fn halt(&self) {
        {
            let mut state = self.state.lock();
            state.halted = true;
            state.pending.clear();
        }
        self.changed.notify_waiters();
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }
}
