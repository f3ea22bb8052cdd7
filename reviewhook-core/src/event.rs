//! Inbound webhook data: the untrusted envelope, the bus event it becomes
//! once verified, and the typed pull request event the review stage reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Event bus source tag for verified GitHub webhooks.
pub const WEBHOOK_SOURCE: &str = "github.webhook";

/// Event bus detail-type for pull request webhooks.
pub const PULL_REQUEST_DETAIL_TYPE: &str = "github.pull_request";

/// Raw HTTP request captured before trust is established.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub body: Vec<u8>,
    /// Value of the `X-Hub-Signature-256` header.
    pub signature: Option<String>,
    /// Value of the `X-GitHub-Event` header.
    pub event_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEnvelope {
    pub fn new(body: impl Into<Vec<u8>>, signature: Option<String>) -> Self {
        Self {
            body: body.into(),
            signature,
            event_name: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }
}

/// A verified webhook forwarded onto the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: Uuid,
    pub source: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub time: DateTime<Utc>,
    /// The original webhook JSON body.
    pub detail: serde_json::Value,
}

impl BusEvent {
    pub fn pull_request(detail: serde_json::Value, time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: WEBHOOK_SOURCE.to_string(),
            detail_type: PULL_REQUEST_DETAIL_TYPE.to_string(),
            time,
            detail,
        }
    }

    /// Whether this event is routed to the review pipeline.
    pub fn matches_review_rule(&self) -> bool {
        self.source == WEBHOOK_SOURCE && self.detail_type == PULL_REQUEST_DETAIL_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Closed,
    ReviewRequested,
    Approved,
    Assigned,
    Other(String),
}

impl PullRequestAction {
    pub fn as_str(&self) -> &str {
        match self {
            PullRequestAction::Opened => "opened",
            PullRequestAction::Synchronize => "synchronize",
            PullRequestAction::Closed => "closed",
            PullRequestAction::ReviewRequested => "review_requested",
            PullRequestAction::Approved => "approved",
            PullRequestAction::Assigned => "assigned",
            PullRequestAction::Other(action) => action,
        }
    }
}

impl From<String> for PullRequestAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "opened" => PullRequestAction::Opened,
            "synchronize" => PullRequestAction::Synchronize,
            "closed" => PullRequestAction::Closed,
            "review_requested" => PullRequestAction::ReviewRequested,
            "approved" => PullRequestAction::Approved,
            "assigned" => PullRequestAction::Assigned,
            _ => PullRequestAction::Other(action),
        }
    }
}

impl From<PullRequestAction> for String {
    fn from(action: PullRequestAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: User,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub head: PullRequestHead,
    pub title: String,
    pub html_url: String,
    pub diff_url: Option<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub merged: Option<bool>,
}

/// A pull request webhook with every field the pipeline reads.
///
/// Construction goes through serde, so a payload lacking any required field is
/// rejected rather than half-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub repository: Repository,
    pub pull_request: PullRequest,
    pub installation: Option<Installation>,
    pub sender: User,
}

impl PullRequestEvent {
    pub fn from_value(detail: &serde_json::Value) -> Result<Self, PipelineError> {
        Self::deserialize(detail).map_err(|e| PipelineError::MalformedEvent(e.to_string()))
    }

    pub fn owner(&self) -> &str {
        &self.repository.owner.login
    }

    pub fn repo(&self) -> &str {
        &self.repository.name
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner(), self.repo())
    }

    pub fn head_sha(&self) -> &str {
        &self.pull_request.head.sha
    }

    pub fn is_draft(&self) -> bool {
        self.pull_request.draft.unwrap_or(false)
    }

    pub fn is_merged(&self) -> bool {
        self.pull_request.merged.unwrap_or(false)
    }

    pub fn installation_id(&self) -> Result<u64, PipelineError> {
        self.installation
            .as_ref()
            .map(|i| i.id)
            .ok_or_else(|| PipelineError::MalformedEvent("missing installation.id".to_string()))
    }
}
