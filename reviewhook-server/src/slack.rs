use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use tracing::info;

use reviewhook_core::ChatNotifier;

/// Posts messages to a Slack-compatible incoming webhook.
pub struct SlackNotifier {
    client: ClientWithMiddleware,
    webhook_url: String,
}

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

impl SlackNotifier {
    pub fn new(client: ClientWithMiddleware, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl ChatNotifier for SlackNotifier {
    async fn post_message(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&SlackMessage { text })
            .send()
            .await
            .context("Failed to send chat message")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Chat webhook returned {} - {}", status, body);
        }

        info!("Chat notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::create_http_client;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn notifier(server: &Server) -> SlackNotifier {
        SlackNotifier::new(
            create_http_client("slack", Duration::from_secs(5)).unwrap(),
            format!("{}/services/T000/B000/XXXX", server.url()),
        )
    }

    #[tokio::test]
    async fn test_message_is_posted_as_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/services/T000/B000/XXXX")
            .match_body(Matcher::Json(json!({"text": "🔄 Pull request #7 was synchronized."})))
            .with_body("ok")
            .create_async()
            .await;

        notifier(&server)
            .post_message("🔄 Pull request #7 was synchronized.")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/services/T000/B000/XXXX")
            .with_status(404)
            .with_body("no_service")
            .create_async()
            .await;

        let err = notifier(&server).post_message("hello").await.unwrap_err();

        assert!(err.to_string().contains("404"));
    }
}
