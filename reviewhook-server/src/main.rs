use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reviewhook_core::{Collaborators, LanguageModel, Pipeline, SecretStore};
use reviewhook_server::bus::{dispatch_loop, ChannelEventBus};
use reviewhook_server::config::Config;
use reviewhook_server::github::GitHubClient;
use reviewhook_server::http_client::create_http_client;
use reviewhook_server::model::{AnthropicClient, ModelProvider, OpenAIClient};
use reviewhook_server::secrets::{EnvSecretStore, FileSecretStore};
use reviewhook_server::slack::SlackNotifier;
use reviewhook_server::{app, get_service_version, AppState};

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    init_logging(config.json_logs);
    info!("Starting reviewhook {}", get_service_version());
    info!("Configuration: {:?}", config);

    let secrets: Arc<dyn SecretStore> = match &config.secrets_dir {
        Some(dir) => {
            info!("Reading secrets from {}", dir.display());
            Arc::new(FileSecretStore::new(dir))
        }
        None => {
            info!("Reading secrets from environment variables");
            Arc::new(EnvSecretStore)
        }
    };

    let github_client = GitHubClient::new(
        create_http_client("github", config.call_timeout)?,
        config.github_api_url.clone(),
    );

    let model_http = create_http_client("model", config.call_timeout)?;
    let model: Arc<dyn LanguageModel> = match config.model_provider {
        ModelProvider::Anthropic => Arc::new(AnthropicClient::new(
            model_http,
            config.model_api_url.clone(),
            config.model_api_key.clone(),
        )),
        ModelProvider::OpenAI => Arc::new(OpenAIClient::new(
            model_http,
            config.model_api_url.clone(),
            config.model_api_key.clone(),
        )),
    };

    let chat = SlackNotifier::new(
        create_http_client("slack", config.call_timeout)?,
        config.slack_webhook_url.clone(),
    );

    let pipeline = Arc::new(Pipeline::new(
        Collaborators {
            secrets,
            source_control: Arc::new(github_client),
            model,
            chat: Arc::new(chat),
        },
        config.pipeline_settings(),
    ));

    let (bus, receiver) = ChannelEventBus::new();
    tokio::spawn(dispatch_loop(receiver, pipeline.clone()));

    let app_state = Arc::new(AppState {
        pipeline,
        bus: Arc::new(bus),
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
