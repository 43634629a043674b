//! groupsync — keep directory groups in step with evaluated membership sources.
//!
//! # Usage
//!
//! ```text
//! groupsync job add <partition> <row> --destination <group> [--period <hours>] [...]
//! groupsync job list [--json]
//! groupsync job show <partition> <row>
//! groupsync job ignore-once <partition> <row>
//! groupsync job enable <partition> <row> [--off]
//! groupsync group add <group> [--owner <mail>]... [--member <id>]...
//! groupsync group show <group>
//! groupsync run <snapshot.json> [--dry-run]
//! groupsync diff <source.json> <destination.json> [--json]
//! groupsync schedule
//! groupsync watchdog
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, group::GroupCommand, job::JobCommand, run::RunArgs,
    schedule::ScheduleArgs, watchdog::WatchdogArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "groupsync",
    version,
    about = "Synchronize directory group membership from evaluated sources",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage sync job records.
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Manage groups in the file-backed local directory.
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },

    /// Push a snapshot file through the full pipeline against the local directory.
    Run(RunArgs),

    /// Show additions and removals between two member lists.
    Diff(DiffArgs),

    /// Start a run for every job that is due.
    Schedule(ScheduleArgs),

    /// Flag runs that have been in progress for too long.
    Watchdog(WatchdogArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    groupsync_daemon::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Job { command } => commands::job::run(command),
        Commands::Group { command } => commands::group::run(command),
        Commands::Run(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Schedule(args) => args.run(),
        Commands::Watchdog(args) => args.run(),
    }
}
