//! `groupsync group` — seed and inspect the file-backed local directory.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use groupsync_core::{GroupId, MemberId};
use groupsync_directory::{FileDirectory, GroupRecord};

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group, or replace its owners and members.
    Add(GroupAddArgs),
    /// Print a group's owners and members.
    Show(GroupShowArgs),
}

#[derive(Args, Debug)]
pub struct GroupAddArgs {
    pub group: String,

    /// Owner mail address; repeat for several.
    #[arg(long = "owner")]
    pub owners: Vec<String>,

    /// Initial member id; repeat for several.
    #[arg(long = "member")]
    pub members: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GroupShowArgs {
    pub group: String,
}

pub fn run(cmd: GroupCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let directory = FileDirectory::at_home(&home);

    match cmd {
        GroupCommand::Add(args) => {
            let group = GroupId::from(args.group.as_str());
            let record = GroupRecord {
                owners: args.owners,
                members: args.members.into_iter().map(MemberId::from).collect(),
            };
            directory
                .save_group(&group, &record)
                .with_context(|| format!("failed to save group '{group}'"))?;
            println!(
                "✓ Saved group '{}' ({} owner(s), {} member(s))",
                group,
                record.owners.len(),
                record.members.len()
            );
        }
        GroupCommand::Show(args) => {
            let group = GroupId::from(args.group.as_str());
            let record = directory
                .load_group(&group)
                .with_context(|| format!("failed to load group '{group}'"))?
                .with_context(|| format!("group '{group}' does not exist"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
