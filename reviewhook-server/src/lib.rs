pub mod bus;
pub mod config;
pub mod github;
pub mod http_client;
pub mod model;
pub mod secrets;
pub mod slack;
pub mod webhook;

#[cfg(test)]
mod test_support;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use reviewhook_core::{EventBus, Pipeline};

use crate::webhook::webhook_router;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_service_version() -> String {
    match built_info::GIT_COMMIT_HASH {
        Some(git_hash) if git_hash.len() >= 8 => {
            format!("{}+{}", built_info::PKG_VERSION, &git_hash[..8])
        }
        Some(git_hash) => format!("{}+{}", built_info::PKG_VERSION, git_hash),
        None => built_info::PKG_VERSION.to_string(),
    }
}

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub bus: Arc<dyn EventBus>,
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "reviewhook",
        "version": get_service_version()
    })))
}

/// The HTTP surface: health check and the GitHub webhook receiver.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
