//! Chunked transport for membership snapshots.
//!
//! A snapshot of any size is cut into [`Chunk`]s small enough for one
//! transport message. Chunks of one job travel in order over a single
//! session; the receiving side feeds them into a [`SessionBuffer`] which
//! yields the reassembled snapshot once the `is_last` chunk arrives.
//!
//! Law: `merge(split(m, c)?)? == m` for every snapshot `m` with
//! `sequence == 0 && is_last` and every `c > 0`.

use std::mem;

use serde::{Deserialize, Serialize};

use groupsync_core::{GroupId, JobKey, Member, MembershipSnapshot, PartInfo, RunId};

use crate::SyncError;

/// One transport message worth of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub job: JobKey,
    pub run_id: RunId,
    pub destination: GroupId,
    #[serde(default)]
    pub exclusionary: bool,
    #[serde(default)]
    pub part: PartInfo,
    #[serde(default)]
    pub dry_run: bool,
    pub sequence: usize,
    pub is_last: bool,
    pub members: Vec<Member>,
}

/// Split `snapshot` into chunks of exactly `max_chunk_size` members, the last
/// one possibly shorter. Always returns at least one chunk.
pub fn split(snapshot: MembershipSnapshot, max_chunk_size: usize) -> Result<Vec<Chunk>, SyncError> {
    if max_chunk_size == 0 {
        return Err(SyncError::ZeroChunkSize);
    }

    let MembershipSnapshot {
        destination,
        run_id,
        job,
        members,
        exclusionary,
        part,
        dry_run,
        ..
    } = snapshot;

    let chunk_count = members.len().div_ceil(max_chunk_size).max(1);
    let mut chunks = Vec::with_capacity(chunk_count);
    let mut remaining = members.into_iter();

    for sequence in 0..chunk_count {
        let slice: Vec<Member> = remaining.by_ref().take(max_chunk_size).collect();
        chunks.push(Chunk {
            job: job.clone(),
            run_id: run_id.clone(),
            destination: destination.clone(),
            exclusionary,
            part,
            dry_run,
            sequence,
            is_last: sequence + 1 == chunk_count,
            members: slice,
        });
    }

    tracing::debug!(
        job = %job,
        chunks = chunks.len(),
        max_chunk_size,
        "split snapshot into chunks",
    );
    Ok(chunks)
}

/// Reassemble chunks produced by [`split`] into one snapshot.
///
/// Chunks must be complete, in sequence order, and belong to one run.
pub fn merge(chunks: Vec<Chunk>) -> Result<MembershipSnapshot, SyncError> {
    let Some(first) = chunks.first() else {
        return Err(SyncError::Merge("no chunks to merge".to_string()));
    };

    let job = first.job.clone();
    let run_id = first.run_id.clone();
    let destination = first.destination.clone();
    let exclusionary = first.exclusionary;
    let part = first.part;
    let dry_run = first.dry_run;
    let last_index = chunks.len() - 1;

    let total: usize = chunks.iter().map(|c| c.members.len()).sum();
    let mut members = Vec::with_capacity(total);

    for (index, chunk) in chunks.into_iter().enumerate() {
        if chunk.job != job || chunk.run_id != run_id {
            return Err(SyncError::Merge(format!(
                "chunk {index} belongs to {}/{} instead of {job}/{run_id}",
                chunk.job, chunk.run_id
            )));
        }
        if chunk.sequence != index {
            return Err(SyncError::Merge(format!(
                "expected sequence {index}, got {}",
                chunk.sequence
            )));
        }
        if chunk.is_last != (index == last_index) {
            return Err(SyncError::Merge(format!(
                "chunk {index} has is_last={} but {} chunk(s) were collected",
                chunk.is_last,
                last_index + 1
            )));
        }
        members.extend(chunk.members);
    }

    Ok(MembershipSnapshot {
        destination,
        run_id,
        job,
        members,
        exclusionary,
        sequence: 0,
        is_last: true,
        part,
        dry_run,
    })
}

/// Outcome of a completed session: the merged snapshot (or why it could not
/// be merged) and every transport token buffered along the way.
#[derive(Debug)]
pub struct Collected<T> {
    pub result: Result<MembershipSnapshot, SyncError>,
    pub tokens: Vec<T>,
}

/// Accumulates the chunks of one session until the last one arrives.
///
/// Owned by exactly one session worker, so it needs no locking.
#[derive(Debug)]
pub struct SessionBuffer<T> {
    chunks: Vec<Chunk>,
    tokens: Vec<T>,
}

impl<T> Default for SessionBuffer<T> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            tokens: Vec::new(),
        }
    }
}

impl<T> SessionBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `chunk` with its transport `token`.
    ///
    /// Returns `None` until a chunk with `is_last` arrives; then the buffer is
    /// drained and the merge outcome returned with all buffered tokens.
    pub fn push(&mut self, chunk: Chunk, token: T) -> Option<Collected<T>> {
        let is_last = chunk.is_last;
        self.chunks.push(chunk);
        self.tokens.push(token);
        if !is_last {
            return None;
        }

        let chunks = mem::take(&mut self.chunks);
        let tokens = mem::take(&mut self.tokens);
        Some(Collected {
            result: merge(chunks),
            tokens,
        })
    }

    /// Number of chunks waiting for the last one.
    pub fn pending(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: usize) -> MembershipSnapshot {
        let members = (0..n).map(|i| Member::new(format!("u{i}").as_str())).collect();
        MembershipSnapshot::new(
            JobKey::new("p", "r"),
            GroupId::from("g"),
            RunId::from("run"),
            members,
        )
    }

    #[test]
    fn empty_snapshot_yields_single_last_chunk() {
        let chunks = split(snapshot(0), 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_last);
        assert!(chunks[0].members.is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = split(snapshot(20), 10).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].members.len(), 10);
        assert!(chunks[1].is_last);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(split(snapshot(3), 0), Err(SyncError::ZeroChunkSize)));
    }

    #[test]
    fn merge_rejects_out_of_order_chunks() {
        let mut chunks = split(snapshot(25), 10).unwrap();
        chunks.swap(0, 1);
        assert!(matches!(merge(chunks), Err(SyncError::Merge(_))));
    }

    #[test]
    fn merge_rejects_missing_last_chunk() {
        let mut chunks = split(snapshot(25), 10).unwrap();
        chunks.pop();
        assert!(matches!(merge(chunks), Err(SyncError::Merge(_))));
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(matches!(merge(Vec::new()), Err(SyncError::Merge(_))));
    }

    #[test]
    fn session_buffer_waits_for_last_chunk() {
        let chunks = split(snapshot(25), 10).unwrap();
        let mut buffer = SessionBuffer::new();
        let mut collected = None;
        for (token, chunk) in chunks.into_iter().enumerate() {
            assert!(collected.is_none(), "collected before the last chunk");
            collected = buffer.push(chunk, token);
        }
        let collected = collected.expect("last chunk completes the session");
        assert_eq!(collected.tokens, vec![0, 1, 2]);
        assert_eq!(collected.result.unwrap(), snapshot(25));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn session_buffer_returns_tokens_even_when_merge_fails() {
        let mut chunks = split(snapshot(15), 10).unwrap();
        chunks[1].sequence = 7;
        let mut buffer = SessionBuffer::new();
        assert!(buffer.push(chunks.remove(0), "a").is_none());
        let collected = buffer.push(chunks.remove(0), "b").expect("complete");
        assert!(collected.result.is_err());
        assert_eq!(collected.tokens, vec!["a", "b"]);
    }
}
