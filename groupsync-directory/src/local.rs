//! File-backed directory for local runs and tests.
//!
//! Each group is a JSON document at `<root>/groups/<group>.json`:
//!
//! ```json
//! { "owners": ["owner@example.com"], "members": ["u1", "u2"] }
//! ```
//!
//! Batch semantics mirror the remote directory: a bulk add fails with 400
//! "already exist" when any identity is present, and removing an absent
//! identity is a 404.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use groupsync_core::{store::groupsync_root, GroupId, MemberId};

use crate::api::{DirectoryApi, MembersPage};
use crate::envelope::{BatchRequest, BatchResponse, StepOperation, StepResponse};
use crate::error::{io_err, DirectoryError};

const ALREADY_EXISTS: &str =
    "One or more added object references already exist for the following modified properties: 'members'.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberId>,
}

#[derive(Debug)]
pub struct FileDirectory {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<home>/.groupsync/directory/`
    pub fn at_home(home: &Path) -> Self {
        Self::new(groupsync_root(home).join("directory"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` for ids that cannot name a file.
    fn group_path(&self, group: &GroupId) -> Option<PathBuf> {
        let id = group.0.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return None;
        }
        Some(self.root.join("groups").join(format!("{id}.json")))
    }

    pub fn load_group(&self, group: &GroupId) -> Result<Option<GroupRecord>, DirectoryError> {
        let Some(path) = self.group_path(group) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save_group(&self, group: &GroupId, record: &GroupRecord) -> Result<(), DirectoryError> {
        let Some(path) = self.group_path(group) else {
            return Err(DirectoryError::Http {
                status: 400,
                url: group.0.clone(),
                message: "invalid group id".to_string(),
                retry_after: None,
            });
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    fn apply_batch(&self, batch: &BatchRequest) -> Result<BatchResponse, DirectoryError> {
        let _guard = self.write_lock.lock();
        let Some(mut record) = self.load_group(&batch.group)? else {
            let responses = batch
                .steps
                .iter()
                .map(|step| {
                    StepResponse::new(step.id.clone(), 404)
                        .with_message(format!("Resource '{}' does not exist", batch.group))
                })
                .collect();
            return Ok(BatchResponse { responses });
        };

        let mut changed = false;
        let mut responses = Vec::with_capacity(batch.steps.len());
        for step in &batch.steps {
            let response = match &step.operation {
                StepOperation::AddMembers(members) => {
                    if members.iter().any(|m| record.members.contains(m)) {
                        StepResponse::new(step.id.clone(), 400).with_message(ALREADY_EXISTS)
                    } else {
                        record.members.extend(members.iter().cloned());
                        changed = true;
                        StepResponse::new(step.id.clone(), 204)
                    }
                }
                StepOperation::RemoveMember(member) => {
                    match record.members.iter().position(|m| m == member) {
                        Some(at) => {
                            record.members.remove(at);
                            changed = true;
                            StepResponse::new(step.id.clone(), 204)
                        }
                        None => StepResponse::new(step.id.clone(), 404)
                            .with_message(format!("Resource '{member}' does not exist")),
                    }
                }
            };
            responses.push(response);
        }

        if changed {
            self.save_group(&batch.group, &record)?;
        }
        Ok(BatchResponse { responses })
    }
}

impl DirectoryApi for FileDirectory {
    async fn group_exists(&self, group: &GroupId) -> Result<bool, DirectoryError> {
        Ok(self.load_group(group)?.is_some())
    }

    async fn group_owners(&self, group: &GroupId) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .load_group(group)?
            .map(|record| record.owners)
            .unwrap_or_default())
    }

    async fn members_page(
        &self,
        group: &GroupId,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<MembersPage, DirectoryError> {
        let record = self.load_group(group)?.unwrap_or_default();
        let start = match cursor {
            Some(raw) => raw.parse::<usize>().map_err(|_| DirectoryError::Http {
                status: 400,
                url: group.0.clone(),
                message: format!("invalid page cursor '{raw}'"),
                retry_after: None,
            })?,
            None => 0,
        };
        let page_size = page_size.max(1);
        let end = (start + page_size).min(record.members.len());
        let members = record.members.get(start..end).unwrap_or_default().to_vec();
        let next = (end < record.members.len()).then(|| end.to_string());
        Ok(MembersPage { members, next })
    }

    async fn execute_batch(&self, batch: BatchRequest) -> Result<BatchResponse, DirectoryError> {
        self.apply_batch(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fetch_all_members;
    use crate::envelope::BatchStep;
    use tempfile::TempDir;

    fn ids(raw: &[&str]) -> Vec<MemberId> {
        raw.iter().map(|s| MemberId::from(*s)).collect()
    }

    fn seeded(dir: &TempDir, members: &[&str]) -> (FileDirectory, GroupId) {
        let directory = FileDirectory::new(dir.path());
        let group = GroupId::from("g1");
        directory
            .save_group(
                &group,
                &GroupRecord {
                    owners: vec!["owner@example.com".into()],
                    members: ids(members),
                },
            )
            .unwrap();
        (directory, group)
    }

    #[tokio::test]
    async fn pages_follow_cursor_to_the_end() {
        let dir = TempDir::new().unwrap();
        let (directory, group) = seeded(&dir, &["a", "b", "c", "d", "e"]);
        let first = directory.members_page(&group, None, 2).await.unwrap();
        assert_eq!(first.members, ids(&["a", "b"]));
        assert_eq!(first.next.as_deref(), Some("2"));

        let all = fetch_all_members(&directory, &group, 2).await.unwrap();
        assert_eq!(all, ids(&["a", "b", "c", "d", "e"]));
    }

    #[tokio::test]
    async fn missing_group_does_not_exist() {
        let dir = TempDir::new().unwrap();
        let directory = FileDirectory::new(dir.path());
        assert!(!directory.group_exists(&GroupId::from("nope")).await.unwrap());
        assert!(!directory.group_exists(&GroupId::from("../x")).await.unwrap());
    }

    #[tokio::test]
    async fn batch_reports_duplicates_and_absent_members() {
        let dir = TempDir::new().unwrap();
        let (directory, group) = seeded(&dir, &["a"]);
        let batch = BatchRequest {
            group: group.clone(),
            steps: vec![
                BatchStep {
                    id: "1".into(),
                    operation: StepOperation::AddMembers(ids(&["a", "b"])),
                },
                BatchStep {
                    id: "2".into(),
                    operation: StepOperation::AddMembers(ids(&["c"])),
                },
                BatchStep {
                    id: "3".into(),
                    operation: StepOperation::RemoveMember(MemberId::from("zz")),
                },
            ],
        };
        let response = directory.execute_batch(batch).await.unwrap();
        let statuses: Vec<u16> = response.responses.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![400, 204, 404]);

        let record = directory.load_group(&group).unwrap().unwrap();
        assert_eq!(record.members, ids(&["a", "c"]));
    }
}
