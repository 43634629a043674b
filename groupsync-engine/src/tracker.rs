//! Part tracker — durable progress of multi-part jobs.
//!
//! Each part's member list is stored under a content address
//! (`<home>/.groupsync/parts/<partition>/<row>/<sha256>.json`), and the
//! tracker record (`<home>/.groupsync/trackers/<partition>/<row>.json`)
//! maps each part index to the address received for it. Aggregation may
//! start only when every index in `0..total_parts` has an entry; afterwards
//! [`delete_at`] removes the tracker and its payloads.
//!
//! Writes use the same atomic `.tmp` + rename pattern as the job store.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use groupsync_core::{store::groupsync_root, JobKey, MemberId, MembershipSnapshot, RunId};

use crate::diff::{aggregate, PartMembers};
use crate::error::{io_err, SyncError};

/// Content address of a stored part payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartRef(pub String);

impl fmt::Display for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Persisted tracker record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPartTrackerState {
    pub run_id: RunId,
    pub total_parts: usize,
    /// Part index → payload address. A re-delivered index replaces its entry.
    #[serde(default)]
    pub completed_parts: BTreeMap<usize, PartRef>,
    #[serde(default)]
    pub destination_part: Option<PartRef>,
}

impl JobPartTrackerState {
    pub fn is_complete(&self) -> bool {
        (0..self.total_parts).all(|index| self.completed_parts.contains_key(&index))
    }
}

/// Result of recording one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerProgress {
    Pending { completed: usize, total: usize },
    Complete(JobPartTrackerState),
}

/// On-disk payload of one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredPart {
    index: usize,
    exclusionary: bool,
    is_destination: bool,
    members: Vec<MemberId>,
}

/// Inputs for the diff once every part has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedParts {
    /// Union of inclusive source parts minus exclusionary parts.
    pub source: Vec<MemberId>,
    /// Baseline from the destination part, if the job has one.
    pub destination: Option<Vec<MemberId>>,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.groupsync/trackers/<partition>/<row>.json`
pub fn tracker_path_at(home: &Path, key: &JobKey) -> PathBuf {
    groupsync_root(home)
        .join("trackers")
        .join(&key.partition_key)
        .join(format!("{}.json", key.row_key))
}

/// `<home>/.groupsync/parts/<partition>/<row>/`
pub fn parts_dir_at(home: &Path, key: &JobKey) -> PathBuf {
    groupsync_root(home)
        .join("parts")
        .join(&key.partition_key)
        .join(&key.row_key)
}

fn part_path_at(home: &Path, key: &JobKey, part: &PartRef) -> PathBuf {
    parts_dir_at(home, key).join(format!("{}.json", part.0))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the tracker for `key`, or `None` when no multi-part run is open.
pub fn load_at(home: &Path, key: &JobKey) -> Result<Option<JobPartTrackerState>, SyncError> {
    let path = tracker_path_at(home, key);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Replace the tracker for `key` atomically.
pub fn save_at(home: &Path, key: &JobKey, state: &JobPartTrackerState) -> Result<(), SyncError> {
    let path = tracker_path_at(home, key);
    write_atomic(&path, &serde_json::to_string_pretty(state)?)
}

/// Remove the tracker and every stored part for `key`. Missing files are fine.
pub fn delete_at(home: &Path, key: &JobKey) -> Result<(), SyncError> {
    let path = tracker_path_at(home, key);
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&path, err)),
    }
    let dir = parts_dir_at(home, key);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(&dir, err)),
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Store `snapshot` as one part of its job and update the tracker.
///
/// A part from a newer run discards whatever the previous run left behind.
/// Re-delivery of an identical part is a no-op; a different payload for an
/// index already recorded replaces the earlier one.
pub fn record_part_at(
    home: &Path,
    snapshot: &MembershipSnapshot,
) -> Result<TrackerProgress, SyncError> {
    let key = &snapshot.job;
    let info = snapshot.part;
    if info.total == 0 || info.index >= info.total {
        return Err(SyncError::Tracker {
            job: key.clone(),
            reason: format!("part {} of {} is out of range", info.index, info.total),
        });
    }

    let mut state = match load_at(home, key)? {
        Some(state) if state.run_id == snapshot.run_id => state,
        Some(stale) => {
            tracing::warn!(
                job = %key,
                stale_run = %stale.run_id,
                run = %snapshot.run_id,
                "discarding part tracker from previous run",
            );
            delete_at(home, key)?;
            new_state(snapshot)
        }
        None => new_state(snapshot),
    };

    if state.total_parts != info.total {
        return Err(SyncError::Tracker {
            job: key.clone(),
            reason: format!(
                "part declares {} total parts, tracker expects {}",
                info.total, state.total_parts
            ),
        });
    }

    let payload = StoredPart {
        index: info.index,
        exclusionary: snapshot.exclusionary,
        is_destination: info.is_destination,
        members: snapshot.member_ids(),
    };
    let part = part_ref(&payload);

    if state.completed_parts.get(&info.index) != Some(&part) {
        let path = part_path_at(home, key, &part);
        write_atomic(&path, &serde_json::to_string(&payload)?)?;
        if let Some(replaced) = state.completed_parts.insert(info.index, part.clone()) {
            tracing::warn!(job = %key, index = info.index, "part re-delivered with new content; replacing");
            if state.destination_part.as_ref() == Some(&replaced) {
                state.destination_part = None;
            }
            remove_part_at(home, key, &replaced)?;
        }
        if info.is_destination {
            state.destination_part = Some(part);
        }
        save_at(home, key, &state)?;
    }

    tracing::debug!(
        job = %key,
        completed = state.completed_parts.len(),
        total = state.total_parts,
        "recorded part",
    );

    if state.is_complete() {
        Ok(TrackerProgress::Complete(state))
    } else {
        Ok(TrackerProgress::Pending {
            completed: state.completed_parts.len(),
            total: state.total_parts,
        })
    }
}

/// Load every completed part and fold them into diff inputs.
pub fn aggregate_at(
    home: &Path,
    key: &JobKey,
    state: &JobPartTrackerState,
) -> Result<AggregatedParts, SyncError> {
    let mut sources = Vec::new();
    let mut destination = None;

    for part in state.completed_parts.values() {
        let path = part_path_at(home, key, part);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let stored: StoredPart = serde_json::from_str(&contents)?;
        if state.destination_part.as_ref() == Some(part) {
            destination = Some(stored.members);
            continue;
        }
        sources.push((
            stored.index,
            PartMembers {
                exclusionary: stored.exclusionary,
                members: stored.members,
            },
        ));
    }

    sources.sort_by_key(|(index, _)| *index);
    let parts: Vec<PartMembers> = sources.into_iter().map(|(_, part)| part).collect();
    Ok(AggregatedParts {
        source: aggregate(&parts),
        destination,
    })
}

fn new_state(snapshot: &MembershipSnapshot) -> JobPartTrackerState {
    JobPartTrackerState {
        run_id: snapshot.run_id.clone(),
        total_parts: snapshot.part.total,
        completed_parts: BTreeMap::new(),
        destination_part: None,
    }
}

fn part_ref(part: &StoredPart) -> PartRef {
    let mut hasher = Sha256::new();
    hasher.update(part.index.to_le_bytes());
    hasher.update([u8::from(part.exclusionary), u8::from(part.is_destination)]);
    for member in &part.members {
        hasher.update(member.0.as_bytes());
        hasher.update(b"\n");
    }
    PartRef(hex::encode(hasher.finalize()))
}

fn remove_part_at(home: &Path, key: &JobKey, part: &PartRef) -> Result<(), SyncError> {
    let path = part_path_at(home, key, part);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(&path, err)),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid tracker path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}
