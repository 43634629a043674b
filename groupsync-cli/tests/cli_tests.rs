use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use groupsync_core::{store, GroupId, JobKey, MemberId, SyncStatus};
use groupsync_directory::FileDirectory;

fn groupsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("groupsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn");
    cmd
}

fn add_sales_job(home: &Path, extra: &[&str]) {
    groupsync_cmd(home)
        .args(["job", "add", "contoso", "sales", "--destination", "g-sales"])
        .args(extra)
        .assert()
        .success()
        .stdout(contains("Added job 'contoso/sales'"));
}

fn add_sales_group(home: &Path, members: &[&str]) {
    let mut cmd = groupsync_cmd(home);
    cmd.args(["group", "add", "g-sales", "--owner", "owner@example.com"]);
    for m in members {
        cmd.args(["--member", m]);
    }
    cmd.assert().success();
}

fn group_members(home: &Path) -> HashSet<MemberId> {
    FileDirectory::at_home(home)
        .load_group(&GroupId::from("g-sales"))
        .expect("load group")
        .expect("group exists")
        .members
        .into_iter()
        .collect()
}

fn write_snapshot(dir: &Path, members: &[&str]) -> PathBuf {
    let members: Vec<_> = members
        .iter()
        .map(|id| serde_json::json!({ "id": id }))
        .collect();
    let snapshot = serde_json::json!({
        "destination": "g-sales",
        "run_id": "run-1",
        "job": { "partition_key": "contoso", "row_key": "sales" },
        "members": members,
    });
    let path = dir.join("snapshot.json");
    fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
    path
}

fn ids(raw: &[&str]) -> HashSet<MemberId> {
    raw.iter().map(|s| MemberId::from(*s)).collect()
}

#[test]
fn job_add_list_show() {
    let home = TempDir::new().expect("home");
    add_sales_job(home.path(), &["--period", "12", "--requestor", "ops@example.com"]);

    groupsync_cmd(home.path())
        .args(["job", "list"])
        .assert()
        .success()
        .stdout(contains("contoso/sales"))
        .stdout(contains("g-sales"));

    groupsync_cmd(home.path())
        .args(["job", "show", "contoso", "sales"])
        .assert()
        .success()
        .stdout(contains("ops@example.com"));

    let job = store::load_job_at(home.path(), &JobKey::new("contoso", "sales")).unwrap();
    assert_eq!(job.period_hours, 12);
    assert!(job.enabled);
}

#[test]
fn duplicate_job_is_refused() {
    let home = TempDir::new().expect("home");
    add_sales_job(home.path(), &[]);

    groupsync_cmd(home.path())
        .args(["job", "add", "contoso", "sales", "--destination", "g-other"])
        .assert()
        .failure()
        .stderr(contains("already exists"));
}

#[test]
fn ignore_once_and_enable_update_the_record() {
    let home = TempDir::new().expect("home");
    add_sales_job(home.path(), &[]);
    let key = JobKey::new("contoso", "sales");

    groupsync_cmd(home.path())
        .args(["job", "ignore-once", "contoso", "sales"])
        .assert()
        .success();
    assert!(store::load_job_at(home.path(), &key).unwrap().ignore_threshold_once);

    groupsync_cmd(home.path())
        .args(["job", "enable", "contoso", "sales", "--off"])
        .assert()
        .success()
        .stdout(contains("Disabled"));
    assert!(!store::load_job_at(home.path(), &key).unwrap().enabled);

    store::update_job_at(home.path(), &key, |j| {
        j.status = SyncStatus::DestinationGroupNotFound
    })
    .unwrap();
    groupsync_cmd(home.path())
        .args(["job", "enable", "contoso", "sales"])
        .assert()
        .success();
    let job = store::load_job_at(home.path(), &key).unwrap();
    assert!(job.enabled);
    assert_eq!(job.status, SyncStatus::Idle);
}

#[test]
fn run_applies_snapshot_to_local_directory() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    add_sales_job(home.path(), &[]);
    add_sales_group(home.path(), &["a", "stale"]);
    let snapshot = write_snapshot(work.path(), &["a", "b", "c"]);

    groupsync_cmd(home.path())
        .arg("run")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(contains("contoso/sales"));

    assert_eq!(group_members(home.path()), ids(&["a", "b", "c"]));
    let job = store::load_job_at(home.path(), &JobKey::new("contoso", "sales")).unwrap();
    assert!(job.last_run_time.is_some());
}

#[test]
fn run_dry_run_leaves_directory_alone() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    add_sales_job(home.path(), &[]);
    add_sales_group(home.path(), &["a", "stale"]);
    let snapshot = write_snapshot(work.path(), &["a", "b"]);

    groupsync_cmd(home.path())
        .arg("run")
        .arg(&snapshot)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(contains("1 to add, 1 to remove"));

    assert_eq!(group_members(home.path()), ids(&["a", "stale"]));
}

#[test]
fn run_without_job_fails() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    add_sales_group(home.path(), &[]);
    let snapshot = write_snapshot(work.path(), &["a"]);

    groupsync_cmd(home.path())
        .arg("run")
        .arg(&snapshot)
        .assert()
        .failure()
        .stdout(contains("no job registered"));
}

#[test]
fn diff_prints_text_and_json() {
    let work = TempDir::new().expect("work");
    let source = work.path().join("source.json");
    let destination = work.path().join("destination.json");
    fs::write(&source, r#"["a", "b", "c"]"#).unwrap();
    fs::write(&destination, r#"["b", "d"]"#).unwrap();

    groupsync_cmd(work.path())
        .arg("diff")
        .arg(&source)
        .arg(&destination)
        .assert()
        .success()
        .stdout(contains("+ a"))
        .stdout(contains("- d"))
        .stdout(contains("2 to add, 1 to remove"));

    let output = groupsync_cmd(work.path())
        .arg("diff")
        .arg(&source)
        .arg(&destination)
        .arg("--json")
        .output()
        .expect("run diff");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["to_add"], serde_json::json!(["a", "c"]));
    assert_eq!(parsed["to_remove"], serde_json::json!(["d"]));
}

#[test]
fn schedule_then_watchdog() {
    let home = TempDir::new().expect("home");
    add_sales_job(home.path(), &[]);

    groupsync_cmd(home.path())
        .arg("schedule")
        .assert()
        .success()
        .stdout(contains("Started 'contoso/sales'"));

    groupsync_cmd(home.path())
        .arg("schedule")
        .assert()
        .success()
        .stdout(contains("No jobs due."));

    let key = JobKey::new("contoso", "sales");
    store::update_job_at(home.path(), &key, |j| {
        j.run_started_at = Some(chrono::Utc::now() - chrono::Duration::hours(24));
    })
    .unwrap();

    groupsync_cmd(home.path())
        .arg("watchdog")
        .assert()
        .success()
        .stdout(contains("StuckInProgress"));
    assert_eq!(
        store::load_job_at(home.path(), &key).unwrap().status,
        SyncStatus::StuckInProgress
    );
}
