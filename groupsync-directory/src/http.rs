//! Blocking HTTP directory client, driven from async code through
//! `spawn_blocking`.

use std::time::Duration;

use serde::Deserialize;

use groupsync_core::{GroupId, MemberId};

use crate::api::{DirectoryApi, MembersPage};
use crate::envelope::{BatchRequest, BatchResponse, WireBatchResponse};
use crate::DirectoryError;

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "GROUPSYNC_DIRECTORY_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OwnerObject {
    mail: Option<String>,
}

#[derive(Clone)]
pub struct HttpDirectory {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl HttpDirectory {
    /// `base_url` is the versioned API root, e.g. `https://graph.example/v1.0`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Build from `base_url` and the token in [`TOKEN_ENV`].
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| DirectoryError::Transport(format!("{TOKEN_ENV} is not set")))?;
        Ok(Self::new(base_url, token))
    }

    fn get_json<T>(&self, url: &str) -> Result<T, DirectoryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(|e| map_ureq_err(url, e))?;
        response
            .into_json()
            .map_err(|e| DirectoryError::Transport(format!("{url}: {e}")))
    }

    fn group_exists_blocking(&self, group: &GroupId) -> Result<bool, DirectoryError> {
        let url = format!("{}/groups/{}?$select=id", self.base_url, group);
        match self.get_json::<IdObject>(&url) {
            Ok(_) => Ok(true),
            Err(DirectoryError::Http { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn group_owners_blocking(&self, group: &GroupId) -> Result<Vec<String>, DirectoryError> {
        let mut url = Some(format!("{}/groups/{}/owners?$select=mail", self.base_url, group));
        let mut owners = Vec::new();
        while let Some(current) = url {
            let page: ObjectList<OwnerObject> = self.get_json(&current)?;
            owners.extend(page.value.into_iter().filter_map(|o| o.mail));
            url = page.next_link;
        }
        Ok(owners)
    }

    fn members_page_blocking(
        &self,
        group: &GroupId,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<MembersPage, DirectoryError> {
        let url = match cursor {
            Some(next_link) => next_link.to_string(),
            None => format!(
                "{}/groups/{}/members?$select=id&$top={}",
                self.base_url, group, page_size
            ),
        };
        let page: ObjectList<IdObject> = self.get_json(&url)?;
        Ok(MembersPage {
            members: page.value.into_iter().map(|o| MemberId(o.id)).collect(),
            next: page.next_link,
        })
    }

    fn execute_batch_blocking(&self, batch: &BatchRequest) -> Result<BatchResponse, DirectoryError> {
        let url = format!("{}/$batch", self.base_url);
        let payload = batch.to_wire(&self.base_url);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(&payload)
            .map_err(|e| map_ureq_err(&url, e))?;
        let wire: WireBatchResponse = response
            .into_json()
            .map_err(|e| DirectoryError::Transport(format!("{url}: {e}")))?;
        Ok(BatchResponse::from(wire))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DirectoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DirectoryError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DirectoryError::Join(e.to_string()))?
}

impl DirectoryApi for HttpDirectory {
    async fn group_exists(&self, group: &GroupId) -> Result<bool, DirectoryError> {
        let (client, group) = (self.clone(), group.clone());
        blocking(move || client.group_exists_blocking(&group)).await
    }

    async fn group_owners(&self, group: &GroupId) -> Result<Vec<String>, DirectoryError> {
        let (client, group) = (self.clone(), group.clone());
        blocking(move || client.group_owners_blocking(&group)).await
    }

    async fn members_page(
        &self,
        group: &GroupId,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<MembersPage, DirectoryError> {
        let (client, group) = (self.clone(), group.clone());
        let cursor = cursor.map(str::to_string);
        blocking(move || client.members_page_blocking(&group, cursor.as_deref(), page_size)).await
    }

    async fn execute_batch(&self, batch: BatchRequest) -> Result<BatchResponse, DirectoryError> {
        let client = self.clone();
        blocking(move || client.execute_batch_blocking(&batch)).await
    }
}

fn map_ureq_err(url: &str, err: ureq::Error) -> DirectoryError {
    match err {
        ureq::Error::Status(status, response) => {
            let retry_after = response
                .header("Retry-After")
                .and_then(|v| v.trim().parse::<u64>().ok());
            DirectoryError::Http {
                status,
                url: url.to_string(),
                message: response.into_string().unwrap_or_default(),
                retry_after,
            }
        }
        ureq::Error::Transport(transport) => DirectoryError::Transport(transport.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = HttpDirectory::new("https://dir.example/v1.0/", "t");
        assert_eq!(client.base_url, "https://dir.example/v1.0");
    }

    #[test]
    fn owner_list_without_value_is_empty() {
        let page: ObjectList<OwnerObject> = serde_json::from_str("{}").unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn member_list_parses_next_link() {
        let raw = r#"{"value":[{"id":"u1"},{"id":"u2"}],"@odata.nextLink":"https://next"}"#;
        let page: ObjectList<IdObject> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.value.len(), 2);
        assert_eq!(page.next_link.as_deref(), Some("https://next"));
    }
}
