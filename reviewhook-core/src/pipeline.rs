//! The Verification -> AI Review -> Notification pipeline.
//!
//! Verification runs inline with the webhook request and hands a [`BusEvent`]
//! to the event bus. Each bus event then drives one independent run of the
//! review and notification stages via [`Pipeline::process`]. No stage error
//! escapes: review failures become a [`StageResult::Failed`] that the
//! notification stage still reports.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, field, info, info_span, warn, Instrument, Span};

use crate::comments::{filter_new, parse_review_comments, DeduplicationPolicy, ReviewComment};
use crate::diff::resolve_diff_source;
use crate::error::{bounded, source_control, PipelineError};
use crate::event::{BusEvent, PullRequestEvent, WebhookEnvelope};
use crate::lease::{PullRequestKey, PullRequestLeases};
use crate::notification::{
    format_notification, format_unidentified_failure, NotificationContext, ReviewOutcome,
};
use crate::ports::{
    AppCredentials, ChatNotifier, LanguageModel, ModelRequest, RepositoryRef, SecretStore,
    SourceControl,
};
use crate::prompt::build_prompt;
use crate::publish::publish;
use crate::routing::should_process;
use crate::signature::verify_signature;

/// The only GitHub event type forwarded for review.
pub const PULL_REQUEST_EVENT_NAME: &str = "pull_request";

const REVIEW_FAILED_MESSAGE: &str = "AI review or comment failed";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Name of the raw webhook HMAC secret.
    pub webhook_secret_name: String,
    /// Name of the JSON GitHub App credential.
    pub app_credentials_secret_name: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound for every external call.
    pub call_timeout: Duration,
    pub deduplication: DeduplicationPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            webhook_secret_name: "githubToken".to_string(),
            app_credentials_secret_name: "githubPK".to_string(),
            model: "claude-3-5-sonnet-20240620".to_string(),
            max_tokens: 1024,
            temperature: 0.5,
            call_timeout: Duration::from_secs(30),
            deduplication: DeduplicationPolicy::ExactMatch,
        }
    }
}

/// External services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub source_control: Arc<dyn SourceControl>,
    pub model: Arc<dyn LanguageModel>,
    pub chat: Arc<dyn ChatNotifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Verifying,
    Routing,
    Resolving,
    Prompting,
    Publishing,
    Notifying,
    Done,
    Failed,
}

/// Result of the verification stage for an authentic webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Forward this event to the bus.
    Forward(BusEvent),
    /// Authentic, but not a pull request event.
    Ignored { event_name: String },
}

/// Error descriptor carried by a failed stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBody {
    pub message: String,
    pub error: String,
    pub retryable: bool,
    /// The original event, when one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
}

/// Status envelope passed from the review stage to the notification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "lowercase")]
pub enum StageResult {
    /// Carries the original event unchanged.
    Success(Value),
    Failed(FailureBody),
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success(_))
    }
}

/// Everything one run did, for logging and tests.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub trace: Vec<PipelineState>,
    pub review: Option<StageResult>,
    pub published: Vec<ReviewComment>,
    /// The error that failed verification or review.
    pub error: Option<PipelineError>,
    pub notification_error: Option<PipelineError>,
}

impl PipelineReport {
    fn enter(&mut self, state: PipelineState) {
        info!("Pipeline state: {:?}", state);
        self.trace.push(state);
    }

    pub fn final_state(&self) -> Option<PipelineState> {
        self.trace.last().copied()
    }

    pub fn reached(&self, state: PipelineState) -> bool {
        self.trace.contains(&state)
    }
}

pub struct Pipeline {
    collaborators: Collaborators,
    leases: PullRequestLeases,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            leases: PullRequestLeases::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Authenticate a webhook and turn it into a bus event.
    ///
    /// The body is only parsed after the signature checks out.
    pub async fn verify(&self, envelope: &WebhookEnvelope) -> Result<Verification, PipelineError> {
        let secret = self
            .resolve_secret(&self.settings.webhook_secret_name)
            .await?;

        if !verify_signature(&secret, &envelope.body, envelope.signature.as_deref()) {
            warn!("Webhook signature verification failed");
            return Err(PipelineError::SignatureInvalid);
        }

        if let Some(event_name) = envelope.event_name.as_deref() {
            if event_name != PULL_REQUEST_EVENT_NAME {
                info!("Ignoring GitHub '{}' event", event_name);
                return Ok(Verification::Ignored {
                    event_name: event_name.to_string(),
                });
            }
        }

        let detail: Value = serde_json::from_slice(&envelope.body)
            .map_err(|e| PipelineError::MalformedEvent(e.to_string()))?;

        Ok(Verification::Forward(BusEvent::pull_request(
            detail,
            envelope.received_at,
        )))
    }

    /// Run all stages for one webhook, including verification.
    pub async fn run(&self, envelope: &WebhookEnvelope) -> PipelineReport {
        let mut report = PipelineReport::default();
        report.enter(PipelineState::Verifying);

        match self.verify(envelope).await {
            Ok(Verification::Forward(event)) => {
                self.process_into(event, &mut report).await;
            }
            Ok(Verification::Ignored { .. }) => report.enter(PipelineState::Done),
            Err(e) => {
                error!("Verification failed: {}", e);
                report.error = Some(e);
                report.enter(PipelineState::Failed);
            }
        }

        report
    }

    /// Run the review and notification stages for a verified event.
    pub async fn process(&self, event: BusEvent) -> PipelineReport {
        let mut report = PipelineReport::default();
        self.process_into(event, &mut report).await;
        report
    }

    async fn process_into(&self, event: BusEvent, report: &mut PipelineReport) {
        let span = info_span!(
            "pipeline",
            event_id = %event.id,
            pull_request = field::Empty
        );

        async {
            let review = self.review_stage(&event.detail, report).await;

            report.enter(PipelineState::Notifying);
            if let Err(e) = self.notify(&review).await {
                error!("Notification failed: {}", e);
                report.notification_error = Some(e);
            }

            let terminal = if review.is_success() && report.notification_error.is_none() {
                PipelineState::Done
            } else {
                PipelineState::Failed
            };
            report.review = Some(review);
            report.enter(terminal);
        }
        .instrument(span)
        .await
    }

    /// The AI review stage. Never fails; errors become `StageResult::Failed`.
    pub(crate) async fn review_stage(&self, detail: &Value, report: &mut PipelineReport) -> StageResult {
        report.enter(PipelineState::Routing);

        let event = match PullRequestEvent::from_value(detail) {
            Ok(event) => event,
            Err(e) => return Self::fail(report, e, detail),
        };
        Span::current().record(
            "pull_request",
            field::display(format!("{}#{}", event.slug(), event.number)),
        );

        if !should_process(&event) {
            info!(
                "Skipping review of PR #{} in {} (action: {}, draft: {}, merged: {})",
                event.number,
                event.slug(),
                event.action,
                event.is_draft(),
                event.is_merged()
            );
            return StageResult::Success(detail.clone());
        }

        match self.review(&event, report).await {
            Ok(posted) => {
                info!(
                    "Review of PR #{} in {} posted {} comments",
                    event.number,
                    event.slug(),
                    posted.len()
                );
                report.published = posted;
                StageResult::Success(detail.clone())
            }
            Err(e) => Self::fail(report, e, detail),
        }
    }

    async fn review(
        &self,
        event: &PullRequestEvent,
        report: &mut PipelineReport,
    ) -> Result<Vec<ReviewComment>, PipelineError> {
        let limit = self.settings.call_timeout;
        let scm = self.collaborators.source_control.as_ref();

        report.enter(PipelineState::Resolving);
        let installation_id = event.installation_id()?;
        let credentials = self.app_credentials().await?;
        let token = bounded(
            "mint installation token",
            limit,
            scm.installation_token(&credentials, installation_id),
            source_control("mint installation token"),
        )
        .await?;

        let locator = resolve_diff_source(event, scm, &token, limit).await?;
        let diff = bounded(
            "fetch diff",
            limit,
            scm.fetch_diff(&token, &locator),
            source_control("fetch diff"),
        )
        .await?;

        if diff.trim().is_empty() {
            info!("Diff {} is empty, skipping review", locator);
            return Ok(Vec::new());
        }

        report.enter(PipelineState::Prompting);
        let key = PullRequestKey::new(event.owner(), event.repo(), event.number);
        let _lease = self.leases.acquire(&key).await;

        let repository = RepositoryRef::new(event.owner(), event.repo());
        let previous = bounded(
            "list review comments",
            limit,
            scm.list_review_comment_bodies(&token, &repository, event.number),
            source_control("list review comments"),
        )
        .await?;

        let request = ModelRequest {
            model: self.settings.model.clone(),
            prompt: build_prompt(&diff, &previous),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let response = bounded(
            "invoke model",
            limit,
            self.collaborators.model.invoke(&request),
            |e| PipelineError::ModelInvocationFailed(format!("{:#}", e)),
        )
        .await?;

        let candidates = match parse_review_comments(&response) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("{}; treating as no comments", e);
                Vec::new()
            }
        };
        let comments = filter_new(candidates, &previous, self.settings.deduplication);

        report.enter(PipelineState::Publishing);
        publish(scm, &token, event, comments, limit)
            .await
            .into_result()
    }

    /// The notification stage.
    pub async fn notify(&self, result: &StageResult) -> Result<(), PipelineError> {
        let text = render_notification(result);
        bounded(
            "post chat message",
            self.settings.call_timeout,
            self.collaborators.chat.post_message(&text),
            |e| PipelineError::NotificationDeliveryFailed(format!("{:#}", e)),
        )
        .await
    }

    async fn resolve_secret(&self, name: &str) -> Result<String, PipelineError> {
        let owned_name = name.to_string();
        let secret = bounded(
            "resolve secret",
            self.settings.call_timeout,
            self.collaborators.secrets.get_secret(name),
            move |e| PipelineError::SecretNotFound {
                name: owned_name,
                reason: format!("{:#}", e),
            },
        )
        .await?;

        secret.ok_or_else(|| PipelineError::SecretNotFound {
            name: name.to_string(),
            reason: "no secret with this name".to_string(),
        })
    }

    async fn app_credentials(&self) -> Result<AppCredentials, PipelineError> {
        let name = &self.settings.app_credentials_secret_name;
        let raw = self.resolve_secret(name).await?;
        serde_json::from_str(&raw).map_err(|e| PipelineError::SecretNotFound {
            name: name.clone(),
            reason: format!("not a valid app credential: {}", e),
        })
    }

    fn fail(report: &mut PipelineReport, e: PipelineError, detail: &Value) -> StageResult {
        error!("AI review failed: {}", e);
        let body = FailureBody {
            message: REVIEW_FAILED_MESSAGE.to_string(),
            error: e.to_string(),
            retryable: e.is_retryable(),
            event: Some(detail.clone()),
        };
        report.error = Some(e);
        StageResult::Failed(body)
    }
}

/// Chat message for a review stage result.
pub fn render_notification(result: &StageResult) -> String {
    let (detail, outcome) = match result {
        StageResult::Success(detail) => (Some(detail), ReviewOutcome::Success),
        StageResult::Failed(body) => (
            body.event.as_ref(),
            ReviewOutcome::Failed {
                error: body.error.clone(),
            },
        ),
    };

    let event = detail.and_then(|d| PullRequestEvent::from_value(d).ok());
    match (event, outcome) {
        (Some(event), outcome) => {
            let outcome = match outcome {
                ReviewOutcome::Success if !should_process(&event) => ReviewOutcome::Skipped,
                other => other,
            };
            format_notification(&event.action, &outcome, &NotificationContext::from(&event))
        }
        (None, ReviewOutcome::Failed { error }) => format_unidentified_failure(&error),
        (None, _) => format_unidentified_failure("event payload could not be read"),
    }
}
