//! Language-model providers behind [`LanguageModel`].

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reviewhook_core::{LanguageModel, ModelRequest};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const OPENAI_API_URL: &str = "https://api.openai.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Anthropic,
    OpenAI,
}

impl ModelProvider {
    pub fn default_api_url(&self) -> &'static str {
        match self {
            ModelProvider::Anthropic => ANTHROPIC_API_URL,
            ModelProvider::OpenAI => OPENAI_API_URL,
        }
    }
}

impl FromStr for ModelProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ModelProvider::Anthropic),
            "openai" => Ok(ModelProvider::OpenAI),
            other => Err(anyhow!(
                "unknown model provider '{}', expected anthropic or openai",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicMessagesResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

async fn error_for_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("{} API request failed: HTTP {} {}", provider, status, body)
}

/// Anthropic Messages API.
pub struct AnthropicClient {
    client: ClientWithMiddleware,
    api_url: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(client: ClientWithMiddleware, api_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<String> {
        let url = format!("{}/v1/messages", self.api_url.trim_end_matches('/'));
        info!("Invoking Anthropic model {}", request.model);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
                "messages": [
                    {"role": "user", "content": request.prompt}
                ]
            }))
            .send()
            .await
            .context("Failed to call Anthropic Messages API")?;
        let response = error_for_status(response, "Anthropic").await?;

        let parsed: AnthropicMessagesResponse = response
            .json()
            .await
            .context("Failed to decode Anthropic messages response")?;

        Ok(parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// OpenAI Chat Completions API.
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    api_url: String,
    api_key: String,
}

impl OpenAIClient {
    pub fn new(client: ClientWithMiddleware, api_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.api_url.trim_end_matches('/'));
        info!("Invoking OpenAI model {}", request.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
                "messages": [
                    {"role": "user", "content": request.prompt}
                ]
            }))
            .send()
            .await
            .context("Failed to call OpenAI Chat Completions API")?;
        let response = error_for_status(response, "OpenAI").await?;

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .context("Failed to decode chat completions response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| anyhow!("OpenAI API returned no choices"))
    }
}
