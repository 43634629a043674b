//! `groupsync diff <source> <destination>` — preview a membership change.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use groupsync_core::MemberId;

/// Arguments for `groupsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// JSON array of source member ids.
    pub source: PathBuf,

    /// JSON array of current destination member ids.
    pub destination: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let source = read_ids(&self.source)?;
        let destination = read_ids(&self.destination)?;
        let result = groupsync_engine::diff(&source, &destination);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if result.is_empty() {
            println!("No differences.");
            return Ok(());
        }
        for id in &result.to_add {
            println!("{}", format!("+ {id}").green());
        }
        for id in &result.to_remove {
            println!("{}", format!("- {id}").red());
        }
        println!(
            "{} to add, {} to remove",
            result.to_add.len(),
            result.to_remove.len()
        );
        Ok(())
    }
}

fn read_ids(path: &Path) -> Result<Vec<MemberId>> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of ids", path.display()))
}
