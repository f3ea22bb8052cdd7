//! Failure taxonomy shared by every pipeline stage.
//!
//! Collaborators report failures as `anyhow::Error`; the stage that made the
//! call converts them into one of these variants so the orchestrator only ever
//! deals with structured errors.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A single review comment that could not be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentFailure {
    pub path: String,
    pub line: u32,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("secret '{name}' not found: {reason}")]
    SecretNotFound { name: String, reason: String },

    #[error("malformed pull request event: {0}")]
    MalformedEvent(String),

    #[error("no diff available: {0}")]
    NoDiffAvailable(String),

    #[error("source control call '{operation}' failed: {message}")]
    SourceControl {
        operation: &'static str,
        message: String,
    },

    #[error("model invocation failed: {0}")]
    ModelInvocationFailed(String),

    #[error("model response could not be parsed: {0}")]
    ModelResponseUnparseable(String),

    #[error("{} of {} review comments failed to publish", .failures.len(), .attempted)]
    CommentPublishFailed {
        attempted: usize,
        failures: Vec<CommentFailure>,
    },

    #[error("notification delivery failed: {0}")]
    NotificationDeliveryFailed(String),

    #[error("external call '{operation}' timed out after {timeout:?}")]
    ExternalCallTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("event bus rejected event: {0}")]
    EventBus(String),
}

impl PipelineError {
    /// Whether re-running the same event could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceControl { .. }
                | PipelineError::ModelInvocationFailed(_)
                | PipelineError::CommentPublishFailed { .. }
                | PipelineError::NotificationDeliveryFailed(_)
                | PipelineError::ExternalCallTimeout { .. }
                | PipelineError::EventBus(_)
        )
    }
}

/// Run one external call under a hard deadline.
///
/// A collaborator error is mapped through `on_error`; running past `limit`
/// yields [`PipelineError::ExternalCallTimeout`].
pub async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
    on_error: impl FnOnce(anyhow::Error) -> PipelineError,
) -> Result<T, PipelineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(on_error(e)),
        Err(_) => Err(PipelineError::ExternalCallTimeout {
            operation,
            timeout: limit,
        }),
    }
}

/// Error mapper for calls against the source-control host.
pub fn source_control(operation: &'static str) -> impl FnOnce(anyhow::Error) -> PipelineError {
    move |e| PipelineError::SourceControl {
        operation,
        message: format!("{:#}", e),
    }
}
