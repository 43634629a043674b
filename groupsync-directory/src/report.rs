use std::fmt;

use groupsync_core::MemberId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum UpdateStatus {
    #[default]
    Ok,
    Error,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Ok => f.write_str("ok"),
            UpdateStatus::Error => f.write_str("error"),
        }
    }
}

/// Outcome of one directory update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Identities the directory accepted.
    pub success_count: usize,
    /// Identities the directory did not recognise.
    pub users_not_found: Vec<MemberId>,
    /// Identities already present (adds only).
    pub users_already_exist: Vec<MemberId>,
    /// Identities given up on: forbidden, or out of retries.
    pub dropped: Vec<MemberId>,
    pub status: UpdateStatus,
    pub batches_sent: usize,
}

impl UpdateReport {
    pub fn is_ok(&self) -> bool {
        self.status == UpdateStatus::Ok
    }
}
