use std::time::Duration;

use tracing::info;

use crate::error::{bounded, source_control, PipelineError};
use crate::event::{PullRequestAction, PullRequestEvent};
use crate::ports::{InstallationToken, RepositoryRef, SourceControl};

/// Which code delta to review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLocator {
    /// The whole pull request, via its `diff_url`.
    PullRequest { url: String },
    /// A single commit of the pull request.
    Commit {
        repository: RepositoryRef,
        sha: String,
    },
}

impl std::fmt::Display for DiffLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffLocator::PullRequest { url } => write!(f, "{}", url),
            DiffLocator::Commit { repository, sha } => {
                write!(f, "{}/{}@{}", repository.owner, repository.name, sha)
            }
        }
    }
}

/// Pick the diff to review for this event.
///
/// A freshly opened pull request is reviewed as a whole. Any later event
/// reviews only the most recent commit, which is the last one the host lists.
pub async fn resolve_diff_source(
    event: &PullRequestEvent,
    scm: &dyn SourceControl,
    token: &InstallationToken,
    limit: Duration,
) -> Result<DiffLocator, PipelineError> {
    if event.action == PullRequestAction::Opened {
        return match event.pull_request.diff_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(DiffLocator::PullRequest {
                url: url.to_string(),
            }),
            _ => Err(PipelineError::NoDiffAvailable(format!(
                "pull request #{} in {} has no diff_url",
                event.number,
                event.slug()
            ))),
        };
    }

    let repository = RepositoryRef::new(event.owner(), event.repo());
    let commits = bounded(
        "list pull request commits",
        limit,
        scm.list_pull_request_commits(token, &repository, event.number),
        source_control("list pull request commits"),
    )
    .await?;

    let Some(latest) = commits.last() else {
        return Err(PipelineError::NoDiffAvailable(format!(
            "pull request #{} in {} has no commits",
            event.number,
            event.slug()
        )));
    };

    info!(
        "Reviewing latest commit {} of {} on PR #{}",
        latest.sha,
        commits.len(),
        event.number
    );

    Ok(DiffLocator::Commit {
        repository,
        sha: latest.sha.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::sample_payload;
    use crate::ports::{AppCredentials, CommitRef, NewReviewComment};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CommitListing {
        commits: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl CommitListing {
        fn new(commits: Vec<&'static str>) -> Self {
            Self {
                commits,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceControl for CommitListing {
        async fn installation_token(
            &self,
            _credentials: &AppCredentials,
            _installation_id: u64,
        ) -> Result<InstallationToken> {
            unreachable!()
        }

        async fn list_pull_request_commits(
            &self,
            _token: &InstallationToken,
            _repository: &RepositoryRef,
            _pull_number: u64,
        ) -> Result<Vec<CommitRef>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .commits
                .iter()
                .map(|sha| CommitRef {
                    sha: sha.to_string(),
                })
                .collect())
        }

        async fn fetch_diff(&self, _token: &InstallationToken, _locator: &DiffLocator) -> Result<String> {
            unreachable!()
        }

        async fn list_review_comment_bodies(
            &self,
            _token: &InstallationToken,
            _repository: &RepositoryRef,
            _pull_number: u64,
        ) -> Result<Vec<String>> {
            unreachable!()
        }

        async fn create_review_comment(
            &self,
            _token: &InstallationToken,
            _comment: &NewReviewComment,
        ) -> Result<()> {
            unreachable!()
        }
    }

    fn token() -> InstallationToken {
        InstallationToken("ghs_test".to_string())
    }

    fn event(action: &str) -> PullRequestEvent {
        PullRequestEvent::from_value(&sample_payload(action)).unwrap()
    }

    #[tokio::test]
    async fn test_opened_uses_pull_request_diff_url_without_listing_commits() {
        let scm = CommitListing::new(vec!["a"]);
        let mut event = event("opened");
        event.pull_request.diff_url = Some("https://x/1.diff".to_string());

        let locator = resolve_diff_source(&event, &scm, &token(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            locator,
            DiffLocator::PullRequest {
                url: "https://x/1.diff".to_string()
            }
        );
        assert_eq!(scm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_synchronize_uses_last_commit() {
        let scm = CommitListing::new(vec!["a", "b"]);

        let locator = resolve_diff_source(&event("synchronize"), &scm, &token(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            locator,
            DiffLocator::Commit {
                repository: RepositoryRef::new("octo-org", "widgets"),
                sha: "b".to_string()
            }
        );
        assert_eq!(scm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_commits_is_no_diff_available() {
        let scm = CommitListing::new(vec![]);

        let err = resolve_diff_source(&event("synchronize"), &scm, &token(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoDiffAvailable(_)));
    }

    #[tokio::test]
    async fn test_opened_without_diff_url_is_no_diff_available() {
        let scm = CommitListing::new(vec!["a"]);
        let mut event = event("opened");
        event.pull_request.diff_url = None;

        let err = resolve_diff_source(&event, &scm, &token(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoDiffAvailable(_)));
        assert_eq!(scm.calls.load(Ordering::SeqCst), 0);
    }
}
