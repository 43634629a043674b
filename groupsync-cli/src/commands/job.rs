//! `groupsync job` — register and inspect sync jobs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use groupsync_core::{store, GroupId, JobKey, SyncJob, SyncStatus, THRESHOLD_DISABLED};

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Register a new job.
    Add(AddArgs),
    /// List every registered job.
    List(ListArgs),
    /// Print one job record.
    Show(KeyArgs),
    /// Skip the threshold check on the job's next run.
    IgnoreOnce(KeyArgs),
    /// Enable (or with `--off`, disable) a job.
    Enable(EnableArgs),
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    pub partition: String,
    pub row: String,
}

impl KeyArgs {
    fn key(&self) -> JobKey {
        JobKey::new(&self.partition, &self.row)
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Destination group id.
    #[arg(long, short)]
    pub destination: String,

    /// Hours between runs.
    #[arg(long, default_value_t = 6)]
    pub period: u32,

    /// Maximum additions as a percentage of the current size (-1 disables).
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub add_threshold: i32,

    /// Maximum removals as a percentage of the current size (-1 disables).
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub remove_threshold: i32,

    /// Address to notify; repeat for several.
    #[arg(long = "requestor")]
    pub requestors: Vec<String>,

    /// Compute diffs without touching the directory.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct EnableArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Disable instead.
    #[arg(long)]
    pub off: bool,
}

pub fn run(cmd: JobCommand) -> Result<()> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

    match cmd {
        JobCommand::Add(args) => {
            let key = args.key.key();
            for value in [args.add_threshold, args.remove_threshold] {
                anyhow::ensure!(
                    value == THRESHOLD_DISABLED || value >= 0,
                    "threshold must be a percentage or {THRESHOLD_DISABLED}, got {value}"
                );
            }
            let mut job = SyncJob::new(key.clone(), GroupId::from(args.destination.as_str()));
            job.period_hours = args.period;
            job.threshold_percentage_for_additions = args.add_threshold;
            job.threshold_percentage_for_removals = args.remove_threshold;
            job.requestors = args.requestors;
            job.is_dry_run_enabled = args.dry_run;
            store::create_job_at(&home, &job)
                .with_context(|| format!("failed to add job '{key}'"))?;
            println!("✓ Added job '{}' → {}", key, job.destination);
        }
        JobCommand::List(args) => {
            let jobs = store::list_jobs_at(&home).context("failed to list jobs")?;
            if args.json {
                let rows: Vec<JobJson> = jobs.iter().map(JobJson::from).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if jobs.is_empty() {
                println!("No jobs registered. Use `groupsync job add` to create one.");
                return Ok(());
            }
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        JobCommand::Show(args) => {
            let key = args.key();
            let job = store::load_job_at(&home, &key)
                .with_context(|| format!("failed to load job '{key}'"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        JobCommand::IgnoreOnce(args) => {
            let key = args.key();
            store::update_job_at(&home, &key, |job| job.ignore_threshold_once = true)
                .with_context(|| format!("failed to update job '{key}'"))?;
            println!("✓ Next run of '{key}' skips the threshold check");
        }
        JobCommand::Enable(args) => {
            let key = args.key.key();
            let enabled = !args.off;
            store::update_job_at(&home, &key, |job| {
                job.enabled = enabled;
                // A re-enabled job starts over from a clean status.
                if enabled && !job.status.is_schedulable() && job.status != SyncStatus::InProgress {
                    job.status = SyncStatus::Idle;
                }
            })
            .with_context(|| format!("failed to update job '{key}'"))?;
            let verb = if enabled { "Enabled" } else { "Disabled" };
            println!("✓ {verb} job '{key}'");
        }
    }

    Ok(())
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    job: String,
    #[tabled(rename = "destination")]
    destination: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "last run")]
    last_run: String,
}

impl From<&SyncJob> for JobRow {
    fn from(job: &SyncJob) -> Self {
        Self {
            job: job.key.to_string(),
            destination: job.destination.to_string(),
            status: colorize_status(job.status),
            enabled: if job.enabled { "yes".into() } else { "no".into() },
            last_run: job
                .last_run_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".into()),
        }
    }
}

#[derive(Serialize)]
struct JobJson {
    job: String,
    destination: String,
    status: String,
    enabled: bool,
    last_run_time: Option<String>,
    threshold_violations: u32,
}

impl From<&SyncJob> for JobJson {
    fn from(job: &SyncJob) -> Self {
        Self {
            job: job.key.to_string(),
            destination: job.destination.to_string(),
            status: job.status.to_string(),
            enabled: job.enabled,
            last_run_time: job.last_run_time.map(|t| t.to_rfc3339()),
            threshold_violations: job.threshold_violations,
        }
    }
}

fn colorize_status(status: SyncStatus) -> String {
    let text = status.to_string();
    match status {
        SyncStatus::Idle => text.green().to_string(),
        SyncStatus::InProgress | SyncStatus::DryRun => text.cyan().to_string(),
        SyncStatus::ThresholdExceeded | SyncStatus::StuckInProgress => {
            text.yellow().to_string()
        }
        _ => text.red().to_string(),
    }
}
