use crate::event::{PullRequestAction, PullRequestEvent};

/// Decide whether a pull request event warrants an AI review.
///
/// Closed and assigned events, drafts and merged pull requests are skipped.
/// Skipped events still flow to notification unchanged.
pub fn should_process(event: &PullRequestEvent) -> bool {
    if matches!(
        event.action,
        PullRequestAction::Closed | PullRequestAction::Assigned
    ) {
        return false;
    }

    !event.is_draft() && !event.is_merged()
}
