//! Per-pull-request mutual exclusion.
//!
//! Two runs for the same pull request would otherwise both read the existing
//! comments before either posts, and post the same feedback twice. Holding a
//! lease across the read-then-publish sequence serialises them. Leases are
//! in-process only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestKey {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl std::fmt::Display for PullRequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Held while a run reads and writes comments on one pull request.
pub struct Lease {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct PullRequestLeases {
    locks: Mutex<HashMap<PullRequestKey, Arc<AsyncMutex<()>>>>,
}

impl PullRequestLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds the lease for `key`, then take it.
    pub async fn acquire(&self, key: &PullRequestKey) -> Lease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Forget locks that nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        Lease {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of pull requests with a live lease or waiter.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_pull_request_is_serialised() {
        let leases = Arc::new(PullRequestLeases::new());
        let key = PullRequestKey::new("octo-org", "widgets", 7);

        let first = leases.acquire(&key).await;

        let waiter = {
            let leases = leases.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _lease = leases.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_pull_requests_do_not_block() {
        let leases = PullRequestLeases::new();
        let _a = leases.acquire(&PullRequestKey::new("o", "r", 1)).await;

        let b = tokio::time::timeout(
            Duration::from_secs(1),
            leases.acquire(&PullRequestKey::new("o", "r", 2)),
        )
        .await;

        assert!(b.is_ok());
        assert_eq!(leases.active(), 2);
    }

    #[tokio::test]
    async fn test_released_leases_are_forgotten() {
        let leases = PullRequestLeases::new();
        drop(leases.acquire(&PullRequestKey::new("o", "r", 1)).await);
        drop(leases.acquire(&PullRequestKey::new("o", "r", 2)).await);

        assert_eq!(leases.active(), 0);
    }
}
