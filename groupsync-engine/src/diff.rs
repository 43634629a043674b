//! Membership delta between a desired source list and the current destination.
//!
//! Both passes are hash-set lookups, so the cost is O(n + m) even for lists
//! of several million identities. Output order follows first appearance in
//! the input, which keeps downstream batching deterministic.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use groupsync_core::{Member, MemberId, MembershipAction};

/// Additions and removals needed to turn the destination into the source.
///
/// Both lists are distinct and disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub to_add: Vec<MemberId>,
    pub to_remove: Vec<MemberId>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Flatten into a tagged member list so a delta can be chunked.
    pub fn into_members(self) -> Vec<Member> {
        let mut members = Vec::with_capacity(self.to_add.len() + self.to_remove.len());
        members.extend(
            self.to_add
                .into_iter()
                .map(|id| Member::tagged(id, MembershipAction::Add)),
        );
        members.extend(
            self.to_remove
                .into_iter()
                .map(|id| Member::tagged(id, MembershipAction::Remove)),
        );
        members
    }

    /// Rebuild a delta from a tagged member list.
    ///
    /// Untagged members are ignored. An identity keeps the first tag it was
    /// seen with, so the result stays disjoint.
    pub fn from_members(members: &[Member]) -> Self {
        let mut seen: HashSet<&MemberId> = HashSet::with_capacity(members.len());
        let mut result = DiffResult::default();
        for member in members {
            let Some(action) = member.action else {
                continue;
            };
            if !seen.insert(&member.id) {
                continue;
            }
            match action {
                MembershipAction::Add => result.to_add.push(member.id.clone()),
                MembershipAction::Remove => result.to_remove.push(member.id.clone()),
            }
        }
        result
    }
}

/// `to_add = distinct(source) − distinct(destination)`,
/// `to_remove = distinct(destination) − distinct(source)`.
pub fn diff(source: &[MemberId], destination: &[MemberId]) -> DiffResult {
    let destination_set: HashSet<&MemberId> = destination.iter().collect();
    let mut source_set: HashSet<&MemberId> = HashSet::with_capacity(source.len());

    let mut to_add = Vec::new();
    for id in source {
        if source_set.insert(id) && !destination_set.contains(id) {
            to_add.push(id.clone());
        }
    }

    let mut removed: HashSet<&MemberId> = HashSet::new();
    let mut to_remove = Vec::new();
    for id in destination {
        if !source_set.contains(id) && removed.insert(id) {
            to_remove.push(id.clone());
        }
    }

    DiffResult { to_add, to_remove }
}

/// One evaluated part of a multi-part job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartMembers {
    pub exclusionary: bool,
    pub members: Vec<MemberId>,
}

/// Desired membership of a multi-part job: the union of inclusive parts minus
/// the union of exclusionary parts, distinct, in first-seen order.
pub fn aggregate(parts: &[PartMembers]) -> Vec<MemberId> {
    let excluded: HashSet<&MemberId> = parts
        .iter()
        .filter(|p| p.exclusionary)
        .flat_map(|p| p.members.iter())
        .collect();

    let mut seen: HashSet<&MemberId> = HashSet::new();
    let mut desired = Vec::new();
    for id in parts
        .iter()
        .filter(|p| !p.exclusionary)
        .flat_map(|p| p.members.iter())
    {
        if !excluded.contains(id) && seen.insert(id) {
            desired.push(id.clone());
        }
    }
    desired
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|s| MemberId::from(*s)).collect()
    }

    #[rstest]
    #[case::disjoint(&["a", "b"], &["c"], &["a", "b"], &["c"])]
    #[case::full_overlap(&["a", "b"], &["b", "a"], &[], &[])]
    #[case::empty_source(&[], &["a", "b"], &[], &["a", "b"])]
    #[case::empty_destination(&["a", "b"], &[], &["a", "b"], &[])]
    #[case::duplicates(&["a", "a", "b", "b"], &["c", "c", "b"], &["a"], &["c"])]
    #[case::both_empty(&[], &[], &[], &[])]
    fn diff_cases(
        #[case] source: &[&str],
        #[case] destination: &[&str],
        #[case] to_add: &[&str],
        #[case] to_remove: &[&str],
    ) {
        let result = diff(&ids(source), &ids(destination));
        assert_eq!(result.to_add, ids(to_add));
        assert_eq!(result.to_remove, ids(to_remove));
    }

    #[test]
    fn tagged_members_roundtrip_through_delta() {
        let delta = diff(&ids(&["a", "b"]), &ids(&["c"]));
        let members = delta.clone().into_members();
        assert_eq!(members.len(), 3);
        assert_eq!(DiffResult::from_members(&members), delta);
    }

    #[test]
    fn from_members_keeps_first_tag_and_skips_untagged() {
        let members = vec![
            Member::tagged("a", MembershipAction::Add),
            Member::tagged("a", MembershipAction::Remove),
            Member::new("b"),
            Member::tagged("c", MembershipAction::Remove),
        ];
        let delta = DiffResult::from_members(&members);
        assert_eq!(delta.to_add, ids(&["a"]));
        assert_eq!(delta.to_remove, ids(&["c"]));
    }

    #[test]
    fn aggregate_subtracts_exclusionary_parts() {
        let parts = vec![
            PartMembers {
                exclusionary: false,
                members: ids(&["a", "b", "c"]),
            },
            PartMembers {
                exclusionary: true,
                members: ids(&["b"]),
            },
            PartMembers {
                exclusionary: false,
                members: ids(&["c", "d", "b"]),
            },
        ];
        assert_eq!(aggregate(&parts), ids(&["a", "c", "d"]));
    }
}
