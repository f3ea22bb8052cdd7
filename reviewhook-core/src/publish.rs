use std::time::Duration;

use tracing::{info, warn};

use crate::comments::ReviewComment;
use crate::error::{bounded, source_control, CommentFailure, PipelineError};
use crate::event::PullRequestEvent;
use crate::ports::{InstallationToken, NewReviewComment, RepositoryRef, SourceControl};

/// What happened to each comment handed to [`publish`].
#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub posted: Vec<ReviewComment>,
    pub failures: Vec<CommentFailure>,
}

impl PublishOutcome {
    pub fn attempted(&self) -> usize {
        self.posted.len() + self.failures.len()
    }

    /// Collapse into the pipeline's error type if anything failed.
    pub fn into_result(self) -> Result<Vec<ReviewComment>, PipelineError> {
        if self.failures.is_empty() {
            Ok(self.posted)
        } else {
            Err(PipelineError::CommentPublishFailed {
                attempted: self.attempted(),
                failures: self.failures,
            })
        }
    }
}

/// Post each comment on the pull request, anchored to its head commit.
///
/// Comments are posted one at a time in order. A failed comment is recorded
/// and the rest are still attempted.
pub async fn publish(
    scm: &dyn SourceControl,
    token: &InstallationToken,
    event: &PullRequestEvent,
    comments: Vec<ReviewComment>,
    limit: Duration,
) -> PublishOutcome {
    let repository = RepositoryRef::new(event.owner(), event.repo());
    let mut outcome = PublishOutcome::default();

    for comment in comments {
        let request = NewReviewComment {
            repository: repository.clone(),
            pull_number: event.number,
            commit_id: event.head_sha().to_string(),
            path: comment.path.clone(),
            line: comment.line,
            body: comment.body.clone(),
        };

        let result = bounded(
            "create review comment",
            limit,
            scm.create_review_comment(token, &request),
            source_control("create review comment"),
        )
        .await;

        match result {
            Ok(()) => {
                info!(
                    "Posted review comment on {}:{} for PR #{} in {}",
                    comment.path,
                    comment.line,
                    event.number,
                    event.slug()
                );
                outcome.posted.push(comment);
            }
            Err(e) => {
                warn!(
                    "Failed to post review comment on {}:{}: {}",
                    comment.path, comment.line, e
                );
                outcome.failures.push(CommentFailure {
                    path: comment.path,
                    line: comment.line,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome
}
