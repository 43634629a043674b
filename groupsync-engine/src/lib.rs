//! # groupsync-engine
//!
//! Synchronous heart of the membership sync pipeline: chunked transport,
//! diffing, the threshold governor, multi-part tracking, and run planning.
//!
//! Call [`pipeline::plan_at`] with a collected source list and the current
//! destination to get a governed [`SyncPlan`], then [`pipeline::finish_at`]
//! once the directory update has completed.

pub mod chunker;
pub mod diff;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod threshold;
pub mod tracker;

pub use chunker::{merge, split, Chunk, Collected, SessionBuffer};
pub use diff::{diff, DiffResult};
pub use error::SyncError;
pub use notify::{Notifier, NotificationTemplate, PendingNotification};
pub use pipeline::{RunOutcome, SyncPlan};
