//! Shared throttle gate.
//!
//! A throttling response pauses every worker until one deadline. Concurrent
//! throttle signals collapse into whichever deadline is already pending.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Default)]
pub struct ThrottleGate {
    resume_at: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the gate for `wait` unless a wait is already pending. Returns
    /// `true` when this call set the deadline.
    pub fn trip(&self, wait: Duration) -> bool {
        let now = Instant::now();
        let mut resume_at = self.resume_at.lock();
        match *resume_at {
            Some(at) if at > now => false,
            _ => {
                *resume_at = Some(now + wait);
                true
            }
        }
    }

    /// Deadline currently in force, if any.
    pub fn pending_until(&self) -> Option<Instant> {
        let resume_at = *self.resume_at.lock();
        resume_at.filter(|at| *at > Instant::now())
    }

    /// Sleep until the gate opens. Returns immediately when it is open.
    pub async fn wait(&self) {
        if let Some(at) = self.pending_until() {
            sleep_until(at).await;
        }
    }
}
