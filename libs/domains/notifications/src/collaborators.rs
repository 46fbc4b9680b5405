//! Collaborator seams consumed by the fan-out engine.
//!
//! Each trait is a narrow contract over machinery the engine does not own:
//! markup rendering, the user directory, permalink generation, and visit
//! tracking. In-memory implementations back development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain_issues::{EventKind, Issue, IssueEvent, User};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Renders raw markdown to the text scanned for mentions.
#[cfg_attr(test, mockall::automock)]
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// Pass-through renderer; mention scanning is lexical and works on raw
/// markdown just as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMarkup;

impl MarkupRenderer for PlainMarkup {
    fn render(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Lookup into the user directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a login name, e.g. from a mention token.
    async fn find_by_name(&self, name: &str) -> Option<User>;

    /// Resolve a user id, e.g. from a stored watch record.
    async fn find_by_id(&self, id: Uuid) -> Option<User>;

    /// Every known user; drives global-scope watch evaluation.
    async fn all(&self) -> Vec<User>;
}

/// Fixed user list (for development/testing).
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Vec<User>,
}

impl StaticDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn find_by_name(&self, name: &str) -> Option<User> {
        self.users.iter().find(|user| user.name == name).cloned()
    }

    async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.users.iter().find(|user| user.id == id).cloned()
    }

    async fn all(&self) -> Vec<User> {
        self.users.clone()
    }
}

/// Builds the permalink embedded in notification bodies.
#[cfg_attr(test, mockall::automock)]
pub trait PermalinkBuilder: Send + Sync {
    fn url_for(&self, issue: &Issue, event: &IssueEvent) -> String;
}

/// Permalinks built from a base URL; comment events link to the comment,
/// change events to the change, anything else to the issue itself.
#[derive(Debug, Clone)]
pub struct TemplatePermalinks {
    base_url: String,
}

impl TemplatePermalinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl PermalinkBuilder for TemplatePermalinks {
    fn url_for(&self, issue: &Issue, event: &IssueEvent) -> String {
        let issue_url = format!(
            "{}/{}/issues/{}",
            self.base_url, issue.project.name, issue.number
        );
        match &event.kind {
            EventKind::Commented { .. } => format!("{}#latest-comment", issue_url),
            EventKind::Changed { .. } => format!("{}#latest-change", issue_url),
            EventKind::Opened { .. } => issue_url,
        }
    }
}

/// Last time a user viewed an issue; used to skip people who have already
/// seen the current state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisitTracker: Send + Sync {
    async fn last_visit(&self, user_id: Uuid, issue_id: Uuid) -> Option<DateTime<Utc>>;
}

/// In-memory visit log (for development/testing).
#[derive(Debug, Clone, Default)]
pub struct InMemoryVisitTracker {
    visits: Arc<RwLock<HashMap<(Uuid, Uuid), DateTime<Utc>>>>,
}

impl InMemoryVisitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_visit(&self, user_id: Uuid, issue_id: Uuid, at: DateTime<Utc>) {
        let mut visits = self.visits.write().await;
        visits.insert((user_id, issue_id), at);
    }
}

#[async_trait]
impl VisitTracker for InMemoryVisitTracker {
    async fn last_visit(&self, user_id: Uuid, issue_id: Uuid) -> Option<DateTime<Utc>> {
        let visits = self.visits.read().await;
        visits.get(&(user_id, issue_id)).copied()
    }
}
