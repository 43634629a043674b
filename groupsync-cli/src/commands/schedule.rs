//! `groupsync schedule` — open a run for every due job.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use groupsync_daemon::scheduler;

#[derive(Args, Debug)]
pub struct ScheduleArgs {}

impl ScheduleArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let started = scheduler::schedule_at(&home, Utc::now()).context("schedule pass failed")?;

        if started.is_empty() {
            println!("No jobs due.");
            return Ok(());
        }
        for job in &started {
            let run = job.run_id.as_ref().map(ToString::to_string).unwrap_or_default();
            println!("✓ Started '{}' (run {})", job.key, run);
        }
        Ok(())
    }
}
