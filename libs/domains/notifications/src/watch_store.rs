//! Persisted watch state, the only durable side effect of the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain_issues::IssueWatch;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::NotificationResult;

/// Store of (issue, user) → watching flags.
///
/// `set_watch` is an idempotent upsert and never removes a record: "not
/// watching" is stored state, distinct from never having been asked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Upsert the watch flag for (issue, user). No-op if the stored value
    /// already matches.
    async fn set_watch(
        &self,
        issue_id: Uuid,
        user_id: Uuid,
        watching: bool,
    ) -> NotificationResult<()>;

    /// All watch records for an issue, in insertion order.
    async fn watches(&self, issue_id: Uuid) -> NotificationResult<Vec<IssueWatch>>;
}

/// In-memory implementation of `WatchStore` (for development/testing).
#[derive(Debug, Default, Clone)]
pub struct InMemoryWatchStore {
    watches: Arc<RwLock<HashMap<Uuid, Vec<IssueWatch>>>>,
}

impl InMemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored flag for (issue, user), if a record exists.
    pub async fn watch_flag(&self, issue_id: Uuid, user_id: Uuid) -> Option<bool> {
        let watches = self.watches.read().await;
        watches
            .get(&issue_id)?
            .iter()
            .find(|watch| watch.user_id == user_id)
            .map(|watch| watch.watching)
    }
}

#[async_trait]
impl WatchStore for InMemoryWatchStore {
    async fn set_watch(
        &self,
        issue_id: Uuid,
        user_id: Uuid,
        watching: bool,
    ) -> NotificationResult<()> {
        let mut watches = self.watches.write().await;
        let records = watches.entry(issue_id).or_default();
        match records.iter_mut().find(|watch| watch.user_id == user_id) {
            Some(record) => {
                if record.watching != watching {
                    record.watching = watching;
                    tracing::debug!(%issue_id, %user_id, watching, "Updated watch");
                }
            }
            None => {
                records.push(IssueWatch { user_id, watching });
                tracing::debug!(%issue_id, %user_id, watching, "Created watch");
            }
        }
        Ok(())
    }

    async fn watches(&self, issue_id: Uuid) -> NotificationResult<Vec<IssueWatch>> {
        let watches = self.watches.read().await;
        Ok(watches.get(&issue_id).cloned().unwrap_or_default())
    }
}
