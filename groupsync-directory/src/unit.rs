//! Work units: the smallest retryable piece of a directory update.

use groupsync_core::MemberId;
use uuid::Uuid;

use crate::envelope::{BatchStep, StepOperation};

/// Largest bulk-add unit the directory accepts in one step.
pub const MAX_MEMBERS_PER_ADD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOperation {
    Add,
    Remove,
}

/// Retry lifecycle: `Bulk → IndividualRetry → Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMode {
    Bulk,
    IndividualRetry,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub id: String,
    pub operation: UnitOperation,
    pub members: Vec<MemberId>,
    pub retry_count: u32,
    pub mode: UnitMode,
}

impl WorkUnit {
    pub fn new(operation: UnitOperation, members: Vec<MemberId>, mode: UnitMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            members,
            retry_count: 0,
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Split a multi-member unit into one unit per identity. Retry counts
    /// start fresh: the demoted identities have not failed individually.
    pub fn demote(self) -> Vec<WorkUnit> {
        let operation = self.operation;
        self.members
            .into_iter()
            .map(|m| WorkUnit::new(operation, vec![m], UnitMode::IndividualRetry))
            .collect()
    }

    /// Count one more attempt. Returns `false` once the unit has used up
    /// `max_retries` and is now `Exhausted`.
    pub fn record_retry(&mut self, max_retries: u32) -> bool {
        self.retry_count += 1;
        if self.retry_count > max_retries {
            self.mode = UnitMode::Exhausted;
            return false;
        }
        true
    }

    pub fn to_step(&self) -> BatchStep {
        let operation = match self.operation {
            UnitOperation::Add => StepOperation::AddMembers(self.members.clone()),
            UnitOperation::Remove => StepOperation::RemoveMember(self.members[0].clone()),
        };
        BatchStep {
            id: self.id.clone(),
            operation,
        }
    }
}

/// Bulk-add units of at most [`MAX_MEMBERS_PER_ADD`] identities.
pub fn partition_additions(members: &[MemberId]) -> Vec<WorkUnit> {
    members
        .chunks(MAX_MEMBERS_PER_ADD)
        .map(|chunk| WorkUnit::new(UnitOperation::Add, chunk.to_vec(), UnitMode::Bulk))
        .collect()
}

/// One unit per removed identity.
pub fn partition_removals(members: &[MemberId]) -> Vec<WorkUnit> {
    members
        .iter()
        .map(|m| WorkUnit::new(UnitOperation::Remove, vec![m.clone()], UnitMode::Bulk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<MemberId> {
        (0..n).map(|i| MemberId(format!("u{i}"))).collect()
    }

    #[test]
    fn additions_are_grouped_by_twenty() {
        let units = partition_additions(&ids(45));
        let sizes: Vec<usize> = units.iter().map(WorkUnit::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert!(units.iter().all(|u| u.mode == UnitMode::Bulk));
    }

    #[test]
    fn removals_are_one_per_unit() {
        let units = partition_removals(&ids(3));
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.len() == 1));
        assert!(matches!(
            units[0].to_step().operation,
            StepOperation::RemoveMember(_)
        ));
    }

    #[test]
    fn demotion_yields_fresh_individual_units() {
        let mut unit = partition_additions(&ids(3)).remove(0);
        unit.retry_count = 2;
        let demoted = unit.demote();
        assert_eq!(demoted.len(), 3);
        assert!(demoted.iter().all(|u| u.mode == UnitMode::IndividualRetry));
        assert!(demoted.iter().all(|u| u.retry_count == 0));
    }

    #[test]
    fn retry_budget_exhausts_after_max() {
        let mut unit = partition_removals(&ids(1)).remove(0);
        assert!(unit.record_retry(2));
        assert!(unit.record_retry(2));
        assert!(!unit.record_retry(2));
        assert_eq!(unit.mode, UnitMode::Exhausted);
    }

    #[test]
    fn unit_ids_are_unique() {
        let units = partition_removals(&ids(50));
        let unique: std::collections::HashSet<_> = units.iter().map(|u| &u.id).collect();
        assert_eq!(unique.len(), 50);
    }
}
