//! groupsync daemon runtime: session collection, sync stages, scheduling.
//!
//! - [`session`] — per-session chunk collection over a [`SessionTransport`]
//! - [`stage`] — [`SyncStage`]: governed diff and directory update per snapshot
//! - [`scheduler`] / [`watchdog`] — run bookkeeping on the job store

mod error;
pub mod locks;
mod runtime;
pub mod scheduler;
pub mod session;
pub mod stage;
pub mod watchdog;

pub use error::DaemonError;
pub use locks::KeyedLocks;
pub use runtime::{block_on, init_tracing, run_local, LOG_JSON_ENV};
pub use session::{InMemoryTransport, SessionReport, SessionRouter, SessionTransport};
pub use stage::{SnapshotSink, StageOutcome, SyncStage};
