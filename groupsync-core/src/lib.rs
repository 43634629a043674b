//! groupsync core library — domain types, job store, configuration, errors.
//!
//! - [`types`] — newtypes, snapshots and the persisted [`SyncJob`]
//! - [`store`] — load / save / list job records
//! - [`config`] — [`SyncConfig`] tunables
//! - [`error`] — [`StoreError`]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use error::StoreError;
pub use types::{
    GroupId, JobKey, Member, MemberId, MembershipAction, MembershipSnapshot, PartInfo, RunId,
    SyncJob, SyncStatus, THRESHOLD_DISABLED,
};
