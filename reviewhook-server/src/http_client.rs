use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::http;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use tracing::{info, trace, warn};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const USER_AGENT: &str = concat!("reviewhook/", env!("CARGO_PKG_VERSION"));

pub struct Sanitizer;

impl Sanitizer {
    /// Header values safe to write to logs.
    pub fn sanitize_headers(headers: &HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if Self::is_sensitive(name.as_str()) {
                    "[REDACTED]".to_string()
                } else {
                    value.to_str().unwrap_or("[BINARY]").to_string()
                };
                (name.to_string(), value)
            })
            .collect()
    }

    fn is_sensitive(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "authorization" | "x-api-key" | "x-hub-signature-256" | "cookie"
        )
    }
}

/// Stamps a correlation id on every outbound request and logs its outcome.
pub struct TracingMiddleware {
    service: &'static str,
}

impl TracingMiddleware {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|existing| existing.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let method = req.method().clone();
        let path = req.url().path().to_string();
        trace!(
            service = self.service,
            correlation_id = %correlation_id,
            headers = ?Sanitizer::sanitize_headers(req.headers()),
            "{} {}",
            method,
            path
        );

        let started = Instant::now();
        let result = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => info!(
                service = self.service,
                correlation_id = %correlation_id,
                elapsed_ms,
                "{} {} -> {}",
                method,
                path,
                response.status().as_u16()
            ),
            Err(e) => warn!(
                service = self.service,
                correlation_id = %correlation_id,
                elapsed_ms,
                "{} {} failed: {}",
                method,
                path,
                e
            ),
        }

        result
    }
}

/// Build the HTTP client used for one external service.
pub fn create_http_client(service: &'static str, timeout: Duration) -> Result<ClientWithMiddleware> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    Ok(ClientBuilder::new(client)
        .with(TracingMiddleware::new(service))
        .build())
}
