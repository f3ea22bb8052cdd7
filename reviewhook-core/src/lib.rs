pub mod comments;
pub mod diff;
pub mod error;
pub mod event;
pub mod lease;
pub mod notification;
pub mod pipeline;
pub mod ports;
pub mod prompt;
pub mod publish;
pub mod routing;
pub mod signature;

pub use comments::{DeduplicationPolicy, ReviewComment};
pub use diff::DiffLocator;
pub use error::{CommentFailure, PipelineError};
pub use event::{BusEvent, PullRequestAction, PullRequestEvent, WebhookEnvelope};
pub use pipeline::{
    Collaborators, FailureBody, Pipeline, PipelineReport, PipelineSettings, PipelineState,
    StageResult, Verification,
};
pub use ports::*;
pub use signature::{sign, verify_signature};
