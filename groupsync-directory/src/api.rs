//! The directory surface the pipeline depends on.

use std::future::Future;

use groupsync_core::{GroupId, MemberId};

use crate::envelope::{BatchRequest, BatchResponse};
use crate::DirectoryError;

/// One page of a group's current members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembersPage {
    pub members: Vec<MemberId>,
    /// Opaque continuation token; `None` on the last page.
    pub next: Option<String>,
}

/// Directory operations used by the sync stages and the update engine.
///
/// Implementations must be safe to call concurrently from every worker.
pub trait DirectoryApi: Send + Sync + 'static {
    fn group_exists(
        &self,
        group: &GroupId,
    ) -> impl Future<Output = Result<bool, DirectoryError>> + Send;

    /// Contact addresses of the group's owners.
    fn group_owners(
        &self,
        group: &GroupId,
    ) -> impl Future<Output = Result<Vec<String>, DirectoryError>> + Send;

    fn members_page(
        &self,
        group: &GroupId,
        cursor: Option<&str>,
        page_size: usize,
    ) -> impl Future<Output = Result<MembersPage, DirectoryError>> + Send;

    /// Submit one batch. Per-step failures are reported in the response;
    /// `Err` means the call as a whole failed.
    fn execute_batch(
        &self,
        batch: BatchRequest,
    ) -> impl Future<Output = Result<BatchResponse, DirectoryError>> + Send;
}

/// Follow continuation tokens until the directory reports the last page.
pub async fn fetch_all_members<D: DirectoryApi>(
    api: &D,
    group: &GroupId,
    page_size: usize,
) -> Result<Vec<MemberId>, DirectoryError> {
    let mut members = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = api.members_page(group, cursor.as_deref(), page_size).await?;
        members.extend(page.members);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    tracing::debug!(group = %group, count = members.len(), "read destination members");
    Ok(members)
}
