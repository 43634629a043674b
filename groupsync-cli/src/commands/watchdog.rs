//! `groupsync watchdog` — escalate runs stuck in progress.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use groupsync_core::config;
use groupsync_daemon::watchdog;

#[derive(Args, Debug)]
pub struct WatchdogArgs {}

impl WatchdogArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let config = config::load_at(&home).context("failed to load config")?;
        let transitions =
            watchdog::sweep_at(&home, &config, Utc::now()).context("watchdog sweep failed")?;

        if transitions.is_empty() {
            println!("No stuck runs.");
            return Ok(());
        }
        for t in &transitions {
            println!(
                "{} '{}': {} → {}",
                "!".yellow(),
                t.job,
                t.from,
                t.to.to_string().yellow()
            );
        }
        Ok(())
    }
}
