use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use reviewhook_core::{PipelineError, Verification, WebhookEnvelope};

use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// GitHub caps webhook payloads at 25 MB.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookResponse {
    pub message: String,
}

fn respond(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(WebhookResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Authenticates the raw body before any handler sees it.
async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read webhook body: {}", e);
            return respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let delivery = header_value(&parts.headers, DELIVERY_HEADER).unwrap_or_default();
    let mut envelope = WebhookEnvelope::new(
        bytes.to_vec(),
        header_value(&parts.headers, SIGNATURE_HEADER),
    );
    if let Some(event_name) = header_value(&parts.headers, EVENT_HEADER) {
        envelope = envelope.with_event_name(event_name);
    }

    let verification = match state.pipeline.verify(&envelope).await {
        Ok(verification) => verification,
        Err(PipelineError::SignatureInvalid) => {
            warn!("Rejected webhook delivery '{}': bad signature", delivery);
            return respond(StatusCode::FORBIDDEN, "Forbidden");
        }
        Err(e) => {
            error!("Webhook delivery '{}' could not be verified: {}", delivery, e);
            return respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(verification);

    next.run(request).await
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    Extension(verification): Extension<Verification>,
) -> Response {
    match verification {
        Verification::Ignored { event_name } => {
            info!("Acknowledged '{}' event without forwarding", event_name);
            respond(StatusCode::OK, "Ignored")
        }
        Verification::Forward(event) => {
            let id = event.id;
            match state.bus.publish(event).await {
                Ok(()) => {
                    info!("Forwarded pull request event {}", id);
                    respond(StatusCode::OK, "OK")
                }
                Err(e) => {
                    let e = PipelineError::EventBus(format!("{:#}", e));
                    error!("Failed to forward event {}: {}", id, e);
                    respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
    }
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
