//! `groupsync run <snapshot.json>` — sync one or more snapshots end to end.
//!
//! Each snapshot is chunked, sent over the in-memory transport, collected
//! again per session and synced against the file-backed directory under
//! `~/.groupsync/directory`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;

use groupsync_core::MembershipSnapshot;
use groupsync_daemon::{block_on, run_local, SessionReport, StageOutcome};

/// Arguments for `groupsync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// File holding one snapshot object or an array of them.
    pub snapshot: PathBuf,

    /// Compute and report the diff without updating the directory.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Many(Vec<MembershipSnapshot>),
    One(Box<MembershipSnapshot>),
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let raw = fs::read_to_string(&self.snapshot)
            .with_context(|| format!("failed to read {}", self.snapshot.display()))?;
        let file: SnapshotFile = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid snapshot file", self.snapshot.display()))?;
        let mut snapshots = match file {
            SnapshotFile::Many(list) => list,
            SnapshotFile::One(one) => vec![*one],
        };
        if self.dry_run {
            snapshots.iter_mut().for_each(|s| s.dry_run = true);
        }

        let reports = block_on(run_local(&home, snapshots)).context("sync run failed")?;

        let mut failed = 0usize;
        for report in &reports {
            if !print_report(report) {
                failed += 1;
            }
        }
        anyhow::ensure!(failed == 0, "{failed} session(s) did not sync cleanly");
        Ok(())
    }
}

/// Print one session's outcome; false when the session failed.
fn print_report(report: &SessionReport) -> bool {
    let session = &report.session;
    match &report.outcome {
        StageOutcome::Applied(update) => {
            let mark = if update.is_ok() { "✓".green() } else { "✗".red() };
            println!(
                "{mark} {session}: {} applied, {} not found, {} already present, {} dropped ({})",
                update.success_count,
                update.users_not_found.len(),
                update.users_already_exist.len(),
                update.dropped.len(),
                update.status,
            );
            update.is_ok()
        }
        StageOutcome::DryRun { to_add, to_remove } => {
            println!("{} {session}: dry run, {to_add} to add, {to_remove} to remove", "~".cyan());
            true
        }
        StageOutcome::Blocked => {
            println!("{} {session}: blocked by threshold, owners notified", "!".yellow());
            true
        }
        StageOutcome::PartPending { completed, total } => {
            println!("{} {session}: part stored ({completed}/{total})", "…".cyan());
            true
        }
        StageOutcome::JobNotFound => {
            println!("{} {session}: no job registered", "✗".red());
            false
        }
        StageOutcome::JobDisabled => {
            println!("{} {session}: job is disabled, snapshot ignored", "✗".red());
            false
        }
        StageOutcome::DestinationGroupNotFound => {
            println!("{} {session}: destination group not found, job disabled", "✗".red());
            false
        }
        StageOutcome::Rejected(reason) => {
            println!("{} {session}: rejected: {reason}", "✗".red());
            false
        }
    }
}
