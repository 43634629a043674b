//! Domain types for group membership sync.
//!
//! Every persisted type round-trips through serde; job records are stored as
//! YAML, snapshots and chunks travel as JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identity of a directory object (user, device, nested group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a destination group in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a single sync run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Two-part key identifying a sync job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub partition_key: String,
    pub row_key: String,
}

impl JobKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.row_key)
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Requested change for a member inside a delta list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipAction {
    Add,
    Remove,
}

/// One entry of a membership list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<MembershipAction>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            action: None,
        }
    }

    pub fn tagged(id: impl Into<MemberId>, action: MembershipAction) -> Self {
        Self {
            id: id.into(),
            action: Some(action),
        }
    }
}

/// Placement of a snapshot inside a multi-part job.
///
/// Single-part jobs use the default: part 0 of 1, not the destination part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub index: usize,
    pub total: usize,
    #[serde(default)]
    pub is_destination: bool,
}

impl Default for PartInfo {
    fn default() -> Self {
        Self {
            index: 0,
            total: 1,
            is_destination: false,
        }
    }
}

impl PartInfo {
    pub fn is_multi_part(&self) -> bool {
        self.total > 1
    }
}

/// A complete evaluated membership list for one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub destination: GroupId,
    pub run_id: RunId,
    pub job: JobKey,
    pub members: Vec<Member>,
    #[serde(default)]
    pub exclusionary: bool,
    #[serde(default)]
    pub sequence: usize,
    #[serde(default = "default_true")]
    pub is_last: bool,
    #[serde(default)]
    pub part: PartInfo,
    /// Source-level dry run request, independent of the job and global flags.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl MembershipSnapshot {
    pub fn new(job: JobKey, destination: GroupId, run_id: RunId, members: Vec<Member>) -> Self {
        Self {
            destination,
            run_id,
            job,
            members,
            exclusionary: false,
            sequence: 0,
            is_last: true,
            part: PartInfo::default(),
            dry_run: false,
        }
    }

    /// Member identities in list order, tags discarded.
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Sync job
// ---------------------------------------------------------------------------

/// Persisted status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    InProgress,
    Error,
    ThresholdExceeded,
    StuckInProgress,
    ErroredDueToStuckInProgress,
    DestinationGroupNotFound,
    NotOwnerOfDestinationGroup,
    QueryNotValid,
    DestinationQueryNotValid,
    CustomMembershipDataNotFound,
    FileNotFound,
    /// Not set by this crate: dry runs end in `Idle` with `dry_run_time_stamp`
    /// stamped. Kept so records written with it still load.
    DryRun,
}

impl SyncStatus {
    /// Statuses the scheduler may start a new run from.
    pub fn is_schedulable(self) -> bool {
        matches!(self, SyncStatus::Idle | SyncStatus::ThresholdExceeded)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Threshold value meaning "no limit".
pub const THRESHOLD_DISABLED: i32 = -1;

/// Persistent record of one destination group's sync configuration and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub key: JobKey,
    pub destination: GroupId,
    #[serde(default)]
    pub requestors: Vec<String>,
    #[serde(default)]
    pub status: SyncStatus,
    #[serde(default = "default_threshold")]
    pub threshold_percentage_for_additions: i32,
    #[serde(default = "default_threshold")]
    pub threshold_percentage_for_removals: i32,
    #[serde(default)]
    pub threshold_violations: u32,
    #[serde(default)]
    pub ignore_threshold_once: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_dry_run_enabled: bool,
    #[serde(default = "default_period_hours")]
    pub period_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_run_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run_time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

fn default_threshold() -> i32 {
    100
}

fn default_period_hours() -> u32 {
    6
}

impl SyncJob {
    pub fn new(key: JobKey, destination: GroupId) -> Self {
        Self {
            key,
            destination,
            requestors: Vec::new(),
            status: SyncStatus::Idle,
            threshold_percentage_for_additions: default_threshold(),
            threshold_percentage_for_removals: default_threshold(),
            threshold_violations: 0,
            ignore_threshold_once: false,
            enabled: true,
            is_dry_run_enabled: false,
            period_hours: default_period_hours(),
            last_run_time: None,
            last_successful_run_time: None,
            dry_run_time_stamp: None,
            run_started_at: None,
            run_id: None,
        }
    }

    /// A job that has never completed a run syncs without threshold checks.
    pub fn is_initial_sync(&self) -> bool {
        self.last_run_time.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(MemberId::from("u1").to_string(), "u1");
        assert_eq!(GroupId::from("g1").to_string(), "g1");
        assert_eq!(JobKey::new("tenant", "job-1").to_string(), "tenant/job-1");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn job_yaml_roundtrip_keeps_thresholds() {
        let mut job = SyncJob::new(JobKey::new("p", "r"), GroupId::from("g"));
        job.threshold_percentage_for_removals = THRESHOLD_DISABLED;
        job.last_run_time = Some(Utc::now());
        let yaml = serde_yaml::to_string(&job).expect("serialize");
        let back: SyncJob = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, job);
    }

    #[test]
    fn minimal_job_yaml_fills_defaults() {
        let yaml = "key:\n  partition_key: p\n  row_key: r\ndestination: g\n";
        let job: SyncJob = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(job.status, SyncStatus::Idle);
        assert!(job.enabled);
        assert!(job.is_initial_sync());
        assert_eq!(job.threshold_percentage_for_additions, 100);
    }

    #[test]
    fn record_with_dry_run_status_still_loads() {
        let yaml = "key:\n  partition_key: p\n  row_key: r\ndestination: g\nstatus: DryRun\n";
        let job: SyncJob = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(job.status, SyncStatus::DryRun);
        assert!(!job.status.is_schedulable());
    }

    #[test]
    fn untagged_member_omits_action() {
        let yaml = serde_yaml::to_string(&Member::new("u1")).expect("serialize");
        assert!(!yaml.contains("action"));
    }

    #[test]
    fn schedulable_statuses() {
        assert!(SyncStatus::Idle.is_schedulable());
        assert!(SyncStatus::ThresholdExceeded.is_schedulable());
        assert!(!SyncStatus::InProgress.is_schedulable());
        assert!(!SyncStatus::StuckInProgress.is_schedulable());
    }
}
