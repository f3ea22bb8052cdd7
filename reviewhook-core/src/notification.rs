use crate::event::{PullRequestAction, PullRequestEvent};

/// Appended when the AI review ran and succeeded.
pub const REVIEW_COMPLETED_SUFFIX: &str = "\n\n✅ AI review completed.";

/// How the AI review stage ended, as far as the chat message is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Success,
    /// Routing decided not to review; the event is only announced.
    Skipped,
    Failed { error: String },
}

/// Pull request details quoted in chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContext {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub sender: String,
    pub merged: bool,
}

impl From<&PullRequestEvent> for NotificationContext {
    fn from(event: &PullRequestEvent) -> Self {
        Self {
            owner: event.owner().to_string(),
            repo: event.repo().to_string(),
            number: event.number,
            title: event.pull_request.title.clone(),
            url: event.pull_request.html_url.clone(),
            sender: event.sender.login.clone(),
            merged: event.is_merged(),
        }
    }
}

/// Render the chat message for one pipeline outcome.
///
/// The completion suffix is only added for `opened` and `synchronize`, the
/// two actions that get reviewed in normal operation, and only when a review
/// actually ran. Any failure is always reported.
pub fn format_notification(
    action: &PullRequestAction,
    outcome: &ReviewOutcome,
    ctx: &NotificationContext,
) -> String {
    let slug = format!("{}/{}", ctx.owner, ctx.repo);
    let number = ctx.number;

    let mut text = match action {
        PullRequestAction::Opened => format!(
            "🎉 New pull request opened by {} in {}: {} - <{}|View PR>",
            ctx.sender, slug, ctx.title, ctx.url
        ),
        PullRequestAction::Closed if ctx.merged => {
            format!("✅ Pull request #{} in {} was merged.", number, slug)
        }
        PullRequestAction::Closed => format!(
            "❌ Pull request #{} in {} was closed without merging.",
            number, slug
        ),
        PullRequestAction::ReviewRequested => {
            format!("👀 Pull request #{} in {} requires a review.", number, slug)
        }
        PullRequestAction::Approved => {
            format!("👍 Pull request #{} in {} was approved.", number, slug)
        }
        PullRequestAction::Synchronize => {
            format!("🔄 Pull request #{} in {} was synchronized.", number, slug)
        }
        other => format!(
            "Pull request #{} in {} received an event: {}",
            number, slug, other
        ),
    };

    match outcome {
        ReviewOutcome::Success => {
            if matches!(
                action,
                PullRequestAction::Opened | PullRequestAction::Synchronize
            ) {
                text.push_str(REVIEW_COMPLETED_SUFFIX);
            }
        }
        ReviewOutcome::Skipped => {}
        ReviewOutcome::Failed { error } => {
            text.push_str(&format!("\n\n⚠️ AI review failed: {}", error));
        }
    }

    text
}

/// Message used when the failed event cannot even be read.
pub fn format_unidentified_failure(error: &str) -> String {
    format!(
        "⚠️ AI review failed for an unidentified pull request event: {}",
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(merged: bool) -> NotificationContext {
        NotificationContext {
            owner: "octo-org".to_string(),
            repo: "widgets".to_string(),
            number: 7,
            title: "Add widget sorting".to_string(),
            url: "https://github.com/octo-org/widgets/pull/7".to_string(),
            sender: "alice".to_string(),
            merged,
        }
    }

    #[test]
    fn test_closed_merged_confirms_merge() {
        let text = format_notification(&PullRequestAction::Closed, &ReviewOutcome::Success, &ctx(true));
        assert_eq!(text, "✅ Pull request #7 in octo-org/widgets was merged.");
    }

    #[test]
    fn test_closed_unmerged() {
        let text = format_notification(&PullRequestAction::Closed, &ReviewOutcome::Success, &ctx(false));
        assert_eq!(
            text,
            "❌ Pull request #7 in octo-org/widgets was closed without merging."
        );
    }

    #[test]
    fn test_opened_success_appends_completion() {
        let text = format_notification(&PullRequestAction::Opened, &ReviewOutcome::Success, &ctx(false));
        assert_eq!(
            text,
            "🎉 New pull request opened by alice in octo-org/widgets: Add widget sorting - \
             <https://github.com/octo-org/widgets/pull/7|View PR>\n\n✅ AI review completed."
        );
    }

    #[test]
    fn test_synchronize_success_appends_completion() {
        let text = format_notification(
            &PullRequestAction::Synchronize,
            &ReviewOutcome::Success,
            &ctx(false),
        );
        assert_eq!(
            text,
            "🔄 Pull request #7 in octo-org/widgets was synchronized.\n\n✅ AI review completed."
        );
    }

    #[test]
    fn test_completion_suffix_only_for_reviewed_actions() {
        for action in [
            PullRequestAction::ReviewRequested,
            PullRequestAction::Approved,
            PullRequestAction::Closed,
            PullRequestAction::Assigned,
            PullRequestAction::Other("labeled".to_string()),
        ] {
            let text = format_notification(&action, &ReviewOutcome::Success, &ctx(false));
            assert!(!text.contains("AI review completed"), "{}", text);
        }
    }

    #[test]
    fn test_skipped_review_has_no_completion() {
        let text = format_notification(&PullRequestAction::Opened, &ReviewOutcome::Skipped, &ctx(false));
        assert_eq!(
            text,
            "🎉 New pull request opened by alice in octo-org/widgets: Add widget sorting - \
             <https://github.com/octo-org/widgets/pull/7|View PR>"
        );
    }

    #[test]
    fn test_review_requested_and_approved() {
        assert_eq!(
            format_notification(
                &PullRequestAction::ReviewRequested,
                &ReviewOutcome::Success,
                &ctx(false)
            ),
            "👀 Pull request #7 in octo-org/widgets requires a review."
        );
        assert_eq!(
            format_notification(&PullRequestAction::Approved, &ReviewOutcome::Success, &ctx(false)),
            "👍 Pull request #7 in octo-org/widgets was approved."
        );
    }

    #[test]
    fn test_unknown_action_falls_back() {
        let text = format_notification(
            &PullRequestAction::Other("labeled".to_string()),
            &ReviewOutcome::Success,
            &ctx(false),
        );
        assert_eq!(
            text,
            "Pull request #7 in octo-org/widgets received an event: labeled"
        );
    }

    #[test]
    fn test_failure_is_reported() {
        let text = format_notification(
            &PullRequestAction::Opened,
            &ReviewOutcome::Failed {
                error: "model invocation failed: 503".to_string(),
            },
            &ctx(false),
        );
        assert!(text.starts_with("🎉 New pull request opened by alice"));
        assert!(text.ends_with("\n\n⚠️ AI review failed: model invocation failed: 503"));
        assert!(!text.contains("AI review completed"));
    }
}
