//! Batch envelopes exchanged with the directory.
//!
//! The update engine speaks in [`BatchRequest`] / [`BatchResponse`]. The HTTP
//! client maps them to and from the JSON `$batch` wire shape
//! ([`WireBatchRequest`], [`WireBatchResponse`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use groupsync_core::{GroupId, MemberId};

/// Upper bound on steps per batch call.
pub const MAX_STEPS_PER_BATCH: usize = 20;

/// One mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOperation {
    /// Bulk add of up to 20 identities.
    AddMembers(Vec<MemberId>),
    /// Removal of a single identity.
    RemoveMember(MemberId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStep {
    /// Correlates the response back to its work unit.
    pub id: String,
    pub operation: StepOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub group: GroupId,
    pub steps: Vec<BatchStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResponse {
    pub id: String,
    pub status: u16,
    /// `Retry-After` hint in seconds, when the directory supplied one.
    pub retry_after: Option<u64>,
    /// Error message from the response body, if any.
    pub message: Option<String>,
}

impl StepResponse {
    pub fn new(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            retry_after: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub responses: Vec<StepResponse>,
}

// ---------------------------------------------------------------------------
// JSON $batch wire shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBatchRequest {
    pub requests: Vec<WireRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBatchResponse {
    #[serde(default)]
    pub responses: Vec<WireResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl BatchRequest {
    /// Render as a `$batch` payload. `object_base` prefixes identity
    /// references in bulk-add bodies (`<object_base>/directoryObjects/<id>`).
    pub fn to_wire(&self, object_base: &str) -> WireBatchRequest {
        let group = &self.group.0;
        let requests = self
            .steps
            .iter()
            .map(|step| match &step.operation {
                StepOperation::AddMembers(members) => {
                    let refs: Vec<String> = members
                        .iter()
                        .map(|m| format!("{object_base}/directoryObjects/{}", m.0))
                        .collect();
                    WireRequest {
                        id: step.id.clone(),
                        method: "PATCH".to_string(),
                        url: format!("/groups/{group}"),
                        headers: BTreeMap::from([(
                            "Content-Type".to_string(),
                            "application/json".to_string(),
                        )]),
                        body: Some(serde_json::json!({ "members@odata.bind": refs })),
                    }
                }
                StepOperation::RemoveMember(member) => WireRequest {
                    id: step.id.clone(),
                    method: "DELETE".to_string(),
                    url: format!("/groups/{group}/members/{}/$ref", member.0),
                    headers: BTreeMap::new(),
                    body: None,
                },
            })
            .collect();
        WireBatchRequest { requests }
    }
}

impl From<WireBatchResponse> for BatchResponse {
    fn from(wire: WireBatchResponse) -> Self {
        let responses = wire
            .responses
            .into_iter()
            .map(|r| {
                let retry_after = r
                    .headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
                    .and_then(|(_, value)| value.trim().parse().ok());
                let message = r
                    .body
                    .as_ref()
                    .and_then(|b| b.pointer("/error/message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string);
                StepResponse {
                    id: r.id,
                    status: r.status,
                    retry_after,
                    message,
                }
            })
            .collect();
        BatchResponse { responses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_step_binds_object_references() {
        let request = BatchRequest {
            group: GroupId::from("g1"),
            steps: vec![BatchStep {
                id: "s1".into(),
                operation: StepOperation::AddMembers(vec![MemberId::from("u1"), MemberId::from("u2")]),
            }],
        };
        let wire = request.to_wire("https://dir.example/v1.0");
        let step = &wire.requests[0];
        assert_eq!(step.method, "PATCH");
        assert_eq!(step.url, "/groups/g1");
        let refs = step.body.as_ref().unwrap()["members@odata.bind"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], "https://dir.example/v1.0/directoryObjects/u1");
    }

    #[test]
    fn remove_step_targets_member_ref() {
        let request = BatchRequest {
            group: GroupId::from("g1"),
            steps: vec![BatchStep {
                id: "s2".into(),
                operation: StepOperation::RemoveMember(MemberId::from("u9")),
            }],
        };
        let wire = request.to_wire("https://dir.example/v1.0");
        assert_eq!(wire.requests[0].method, "DELETE");
        assert_eq!(wire.requests[0].url, "/groups/g1/members/u9/$ref");
        assert!(wire.requests[0].body.is_none());
    }

    #[test]
    fn wire_response_extracts_retry_after_and_message() {
        let raw = r#"{
            "responses": [
                {"id": "a", "status": 204},
                {"id": "b", "status": 429, "headers": {"Retry-After": "12"}},
                {"id": "c", "status": 400, "body": {"error": {"code": "Request_BadRequest",
                    "message": "One or more added object references already exist"}}}
            ]
        }"#;
        let wire: WireBatchResponse = serde_json::from_str(raw).unwrap();
        let response = BatchResponse::from(wire);
        assert_eq!(response.responses[0], StepResponse::new("a", 204));
        assert_eq!(response.responses[1].retry_after, Some(12));
        assert!(response.responses[2]
            .message
            .as_deref()
            .unwrap()
            .contains("already exist"));
    }
}
