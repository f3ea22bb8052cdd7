use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reviewhook_core::{DeduplicationPolicy, PipelineSettings};

use crate::github::DEFAULT_API_URL;
use crate::model::ModelProvider;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Name of the raw webhook HMAC secret.
    pub webhook_secret_name: String,
    /// Name of the JSON GitHub App credential.
    pub github_pk_secret_name: String,
    /// When set, secrets are files in this directory. Otherwise they are
    /// environment variables named like the secret.
    pub secrets_dir: Option<PathBuf>,
    pub slack_webhook_url: String,
    pub model_provider: ModelProvider,
    pub model_api_key: String,
    pub model_id: String,
    pub model_api_url: String,
    pub model_max_tokens: u32,
    pub model_temperature: f32,
    pub github_api_url: String,
    /// Bound on every external call.
    pub call_timeout: Duration,
    pub dedup_policy: DeduplicationPolicy,
    pub json_logs: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("webhook_secret_name", &self.webhook_secret_name)
            .field("github_pk_secret_name", &self.github_pk_secret_name)
            .field("secrets_dir", &self.secrets_dir)
            .field("slack_webhook_url", &"[REDACTED]")
            .field("model_provider", &self.model_provider)
            .field("model_api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("model_api_url", &self.model_api_url)
            .field("model_max_tokens", &self.model_max_tokens)
            .field("model_temperature", &self.model_temperature)
            .field("github_api_url", &self.github_api_url)
            .field("call_timeout", &self.call_timeout)
            .field("dedup_policy", &self.dedup_policy)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let webhook_secret_name =
            var("WEBHOOK_SECRET_NAME").unwrap_or_else(|| "githubToken".to_string());
        let github_pk_secret_name =
            var("GITHUB_PK_SECRET_NAME").unwrap_or_else(|| "githubPK".to_string());
        let secrets_dir = var("SECRETS_DIR").map(PathBuf::from);

        let slack_webhook_url = var("SLACK_WEBHOOK_URL")
            .context("SLACK_WEBHOOK_URL environment variable is required")?;
        url::Url::parse(&slack_webhook_url).context("SLACK_WEBHOOK_URL must be a valid URL")?;

        let model_provider = var("MODEL_PROVIDER")
            .map(|p| p.parse::<ModelProvider>())
            .transpose()
            .context("MODEL_PROVIDER is invalid")?
            .unwrap_or(ModelProvider::Anthropic);

        let model_api_key =
            var("MODEL_API_KEY").context("MODEL_API_KEY environment variable is required")?;

        let model_id =
            var("MODEL_ID").unwrap_or_else(|| "claude-3-5-sonnet-20240620".to_string());

        let model_api_url = var("MODEL_API_URL")
            .unwrap_or_else(|| model_provider.default_api_url().to_string());

        let model_max_tokens = var("MODEL_MAX_TOKENS")
            .unwrap_or_else(|| "1024".to_string())
            .parse::<u32>()
            .context("MODEL_MAX_TOKENS must be a valid number")?;

        let model_temperature = var("MODEL_TEMPERATURE")
            .unwrap_or_else(|| "0.5".to_string())
            .parse::<f32>()
            .context("MODEL_TEMPERATURE must be a number")?;
        if !(0.0..=2.0).contains(&model_temperature) {
            bail!("MODEL_TEMPERATURE must be between 0 and 2");
        }

        let github_api_url = var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let timeout_secs = var("EXTERNAL_CALL_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .context("EXTERNAL_CALL_TIMEOUT_SECS must be a valid number")?;
        if timeout_secs == 0 {
            bail!("EXTERNAL_CALL_TIMEOUT_SECS must be positive");
        }

        let dedup_policy = var("DEDUP_POLICY")
            .map(|p| p.parse::<DeduplicationPolicy>())
            .transpose()
            .map_err(|e| anyhow!("DEDUP_POLICY is invalid: {}", e))?
            .unwrap_or_default();

        let json_logs = var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Config {
            port,
            webhook_secret_name,
            github_pk_secret_name,
            secrets_dir,
            slack_webhook_url,
            model_provider,
            model_api_key,
            model_id,
            model_api_url,
            model_max_tokens,
            model_temperature,
            github_api_url,
            call_timeout: Duration::from_secs(timeout_secs),
            dedup_policy,
            json_logs,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            webhook_secret_name: self.webhook_secret_name.clone(),
            app_credentials_secret_name: self.github_pk_secret_name.clone(),
            model: self.model_id.clone(),
            max_tokens: self.model_max_tokens,
            temperature: self.model_temperature,
            call_timeout: self.call_timeout,
            deduplication: self.dedup_policy,
        }
    }
}
