//! In-memory collaborators shared by the server's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use reviewhook_core::{
    AppCredentials, ChatNotifier, Collaborators, CommitRef, DiffLocator, InstallationToken,
    LanguageModel, ModelRequest, NewReviewComment, Pipeline, PipelineSettings, RepositoryRef,
    SecretStore, SourceControl,
};

pub const WEBHOOK_SECRET: &str = "It's a Secret to Everybody";

pub struct StaticSecrets(pub HashMap<String, String>);

impl StaticSecrets {
    pub fn webhook_only() -> Self {
        let mut values = HashMap::new();
        values.insert("githubToken".to_string(), WEBHOOK_SECRET.to_string());
        Self(values)
    }
}

#[async_trait]
impl SecretStore for StaticSecrets {
    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(self.0.get(name).cloned())
    }
}

/// Source control host that is never reachable.
pub struct OfflineHost;

#[async_trait]
impl SourceControl for OfflineHost {
    async fn installation_token(
        &self,
        _credentials: &AppCredentials,
        _installation_id: u64,
    ) -> Result<InstallationToken> {
        Err(anyhow!("offline"))
    }

    async fn list_pull_request_commits(
        &self,
        _token: &InstallationToken,
        _repository: &RepositoryRef,
        _pull_number: u64,
    ) -> Result<Vec<CommitRef>> {
        Err(anyhow!("offline"))
    }

    async fn fetch_diff(&self, _token: &InstallationToken, _locator: &DiffLocator) -> Result<String> {
        Err(anyhow!("offline"))
    }

    async fn list_review_comment_bodies(
        &self,
        _token: &InstallationToken,
        _repository: &RepositoryRef,
        _pull_number: u64,
    ) -> Result<Vec<String>> {
        Err(anyhow!("offline"))
    }

    async fn create_review_comment(
        &self,
        _token: &InstallationToken,
        _comment: &NewReviewComment,
    ) -> Result<()> {
        Err(anyhow!("offline"))
    }
}

pub struct QuietModel;

#[async_trait]
impl LanguageModel for QuietModel {
    async fn invoke(&self, _request: &ModelRequest) -> Result<String> {
        Ok("[]".to_string())
    }
}

#[derive(Default)]
pub struct RecordingChat {
    messages: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub async fn wait_for_message(&self, limit: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if let Some(first) = self.messages().into_iter().next() {
                return Some(first);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn post_message(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn test_pipeline(chat: Arc<RecordingChat>) -> Pipeline {
    test_pipeline_with_secrets(StaticSecrets::webhook_only(), chat)
}

pub fn test_pipeline_with_secrets(secrets: StaticSecrets, chat: Arc<RecordingChat>) -> Pipeline {
    Pipeline::new(
        Collaborators {
            secrets: Arc::new(secrets),
            source_control: Arc::new(OfflineHost),
            model: Arc::new(QuietModel),
            chat,
        },
        PipelineSettings {
            call_timeout: Duration::from_secs(2),
            ..PipelineSettings::default()
        },
    )
}

pub fn payload(action: &str) -> Value {
    json!({
        "action": action,
        "number": 7,
        "repository": {"name": "widgets", "owner": {"login": "octo-org"}},
        "pull_request": {
            "head": {"sha": "abc123"},
            "title": "Add widget sorting",
            "html_url": "https://github.com/octo-org/widgets/pull/7",
            "diff_url": "https://github.com/octo-org/widgets/pull/7.diff",
            "draft": false,
            "merged": false
        },
        "installation": {"id": 4242},
        "sender": {"login": "alice"}
    })
}
