use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use reviewhook_core::{
    AppCredentials, CommitRef, DiffLocator, InstallationToken, NewReviewComment, RepositoryRef,
    SourceControl,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";
const PER_PAGE: usize = 100;

/// GitHub REST client acting as a GitHub App installation.
///
/// Installation tokens are minted fresh for every pipeline run.
#[derive(Clone)]
pub struct GitHubClient {
    client: ClientWithMiddleware,
    api_url: String,
    per_page: usize,
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ReviewCommentResponse {
    body: String,
}

#[derive(Debug, Serialize)]
struct CreateReviewCommentRequest<'a> {
    body: &'a str,
    commit_id: &'a str,
    path: &'a str,
    line: u32,
    side: &'static str,
}

impl GitHubClient {
    pub fn new(client: ClientWithMiddleware, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            per_page: PER_PAGE,
        }
    }

    pub fn with_page_size(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    fn generate_jwt(credentials: &AppCredentials) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: credentials.app_id,
            iat: now - 60,  // Issued 60 seconds ago to account for clock skew
            exp: now + 600, // Expires in 10 minutes
        };

        // Keys pasted into env vars or JSON often carry escaped newlines
        let pem = credentials.private_key.replace("\\n", "\n");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).context("Failed to parse private key")?;

        encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .context("Failed to encode JWT")
    }

    async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!("GitHub API error {}: {} - {}", what, status, error_text);
        Err(anyhow!("GitHub API error {}: {} - {}", what, status, error_text))
    }

    async fn get_paginated<T: DeserializeOwned>(
        &self,
        token: &InstallationToken,
        path: &str,
        what: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let url = format!("{}?page={}&per_page={}", self.url(path), page, self.per_page);

            let response = self
                .client
                .get(&url)
                .bearer_auth(token.as_str())
                .header("Accept", ACCEPT_JSON)
                .send()
                .await
                .with_context(|| format!("Failed to send request {}", what))?;
            let response = Self::ensure_success(response, what).await?;

            let batch: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to parse response {}", what))?;
            let count = batch.len();
            items.extend(batch);

            // A short page is the last one
            if count < self.per_page {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn installation_token(
        &self,
        credentials: &AppCredentials,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let jwt = Self::generate_jwt(credentials)?;
        let url = self.url(&format!(
            "/app/installations/{}/access_tokens",
            installation_id
        ));

        info!(
            "Requesting installation access token for installation {}",
            installation_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", ACCEPT_JSON)
            .send()
            .await
            .context("Failed to send installation token request")?;
        let response = Self::ensure_success(response, "minting installation token").await?;

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        Ok(InstallationToken(token_response.token))
    }

    async fn list_pull_request_commits(
        &self,
        token: &InstallationToken,
        repository: &RepositoryRef,
        pull_number: u64,
    ) -> Result<Vec<CommitRef>> {
        let path = format!(
            "/repos/{}/{}/pulls/{}/commits",
            repository.owner, repository.name, pull_number
        );
        let commits: Vec<CommitResponse> = self
            .get_paginated(token, &path, "listing pull request commits")
            .await?;

        Ok(commits
            .into_iter()
            .map(|c| CommitRef { sha: c.sha })
            .collect())
    }

    async fn fetch_diff(&self, token: &InstallationToken, locator: &DiffLocator) -> Result<String> {
        let response = match locator {
            DiffLocator::PullRequest { url } => self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send pull request diff request")?,
            DiffLocator::Commit { repository, sha } => self
                .client
                .get(self.url(&format!(
                    "/repos/{}/{}/commits/{}",
                    repository.owner, repository.name, sha
                )))
                .bearer_auth(token.as_str())
                .header("Accept", ACCEPT_DIFF)
                .send()
                .await
                .context("Failed to send commit diff request")?,
        };
        let response = Self::ensure_success(response, "fetching diff").await?;

        let diff = response
            .text()
            .await
            .context("Failed to read diff response body")?;
        info!("Fetched diff {} ({} bytes)", locator, diff.len());

        Ok(diff)
    }

    async fn list_review_comment_bodies(
        &self,
        token: &InstallationToken,
        repository: &RepositoryRef,
        pull_number: u64,
    ) -> Result<Vec<String>> {
        let path = format!(
            "/repos/{}/{}/pulls/{}/comments",
            repository.owner, repository.name, pull_number
        );
        let comments: Vec<ReviewCommentResponse> = self
            .get_paginated(token, &path, "listing review comments")
            .await?;

        Ok(comments.into_iter().map(|c| c.body).collect())
    }

    async fn create_review_comment(
        &self,
        token: &InstallationToken,
        comment: &NewReviewComment,
    ) -> Result<()> {
        let url = self.url(&format!(
            "/repos/{}/{}/pulls/{}/comments",
            comment.repository.owner, comment.repository.name, comment.pull_number
        ));
        let request_body = CreateReviewCommentRequest {
            body: &comment.body,
            commit_id: &comment.commit_id,
            path: &comment.path,
            line: comment.line,
            side: "RIGHT",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.as_str())
            .header("Accept", ACCEPT_JSON)
            .json(&request_body)
            .send()
            .await
            .context("Failed to send review comment request")?;
        Self::ensure_success(response, "creating review comment").await?;

        Ok(())
    }
}
