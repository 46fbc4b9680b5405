//! Data models for the issues domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account known to the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Login name, matched against `@name` mentions.
    pub name: String,
    /// Human-readable name used in notification subjects.
    pub display_name: String,
    /// Known email addresses; the first one is the primary address.
    pub emails: Vec<String>,
    /// System accounts author automated events and are never notified.
    pub system: bool,
    /// Personal saved queries, evaluated in the global scope.
    pub personal_queries: Vec<SavedQuery>,
}

impl User {
    /// Create a regular (non-system) user with a single email address.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: display_name.into(),
            emails: vec![email.into()],
            system: false,
            personal_queries: Vec::new(),
        }
    }

    /// The primary email address, if the account has one.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

/// A named collection of users, used only as a role-assignment target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<User>,
}

/// A personal saved filter with a watch intent.
///
/// `watch = false` means the query expresses "stop watching matches" rather
/// than the absence of an opinion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQuery {
    pub query: String,
    pub watch: bool,
}

impl SavedQuery {
    pub fn watching(query: impl Into<String>) -> Self {
        Self { query: query.into(), watch: true }
    }

    pub fn ignoring(query: impl Into<String>) -> Self {
        Self { query: query.into(), watch: false }
    }
}

/// A shared saved query with named subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedQuery {
    pub name: String,
    pub query: String,
    /// Watch policy applied to subscribers when the query matches.
    pub watch: bool,
    pub subscribers: Vec<User>,
}

/// Per-user saved queries stored on a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuerySetting {
    pub user: User,
    pub queries: Vec<SavedQuery>,
}

/// A project scoping issues and their saved queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Project-level shared queries.
    pub named_queries: Vec<NamedQuery>,
    /// Per-user saved queries scoped to this project.
    pub query_settings: Vec<UserQuerySetting>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            named_queries: Vec::new(),
            query_settings: Vec::new(),
        }
    }
}

/// Instance-wide settings relevant to watch evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Globally shared queries, evaluated for their subscribers.
    pub named_queries: Vec<NamedQuery>,
}

/// Persisted watch state of one user for one issue.
///
/// Unique per (issue, user); "not watching" is a stored state, not an absent
/// record, so downstream default policies can distinguish "never asked" from
/// "declined".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueWatch {
    pub user_id: Uuid,
    pub watching: bool,
}

/// A tracked issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub number: u64,
    pub title: String,
    /// Current workflow state label, e.g. "Open".
    pub state: String,
    pub project: Project,
    /// Stable email threading key; defaults to a UUID-derived value.
    pub thread_key: Option<String>,
}

impl Issue {
    pub fn new(project: Project, number: u64, title: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            title: title.into(),
            state: state.into(),
            project,
            thread_key: None,
        }
    }

    /// `#N - title`, as rendered into notification subjects.
    pub fn number_and_title(&self) -> String {
        format!("#{} - {}", self.number, self.title)
    }

    /// The threading reference grouping all mail about this issue, falling
    /// back to `{uuid}@{domain}` when no explicit key is set.
    pub fn threading_reference(&self, mail_domain: &str) -> String {
        self.thread_key
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.id, mail_domain))
    }
}

/// Structured payload of a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChangeData {
    /// Workflow state transition.
    StateTransition { from: String, to: String },
    /// An ordinary field edit.
    FieldChange { field: String },
    /// Description text was edited.
    DescriptionEdit,
    /// Automatic cross-reference created from a code comment.
    ReferencedFromComment,
    /// Automatic cross-reference created from another issue.
    ReferencedFromIssue,
    /// Automatic cross-reference created from a merge request.
    ReferencedFromMergeRequest,
}

impl ChangeData {
    /// Human-readable activity phrase for subjects.
    pub fn summary(&self) -> String {
        match self {
            Self::StateTransition { to, .. } => format!("changed state to \"{}\"", to),
            Self::FieldChange { field } => format!("changed \"{}\"", field),
            Self::DescriptionEdit => "edited description".to_string(),
            Self::ReferencedFromComment => "referenced from a code comment".to_string(),
            Self::ReferencedFromIssue => "referenced from another issue".to_string(),
            Self::ReferencedFromMergeRequest => "referenced from a merge request".to_string(),
        }
    }
}

/// Variant payload of an issue event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventKind {
    /// Issue was opened.
    Opened {
        /// Raw description markdown, scanned for mentions.
        markdown: Option<String>,
    },
    /// Somebody commented.
    Commented {
        markdown: String,
        /// Addresses already reached out-of-band (e.g. reply-to delivery),
        /// excluded from carbon recipients.
        notified_addresses: Vec<String>,
    },
    /// A field, state, or description change.
    Changed {
        change: ChangeData,
        /// Optional comment attached to the change, scanned for mentions.
        comment: Option<String>,
    },
}

impl EventKind {
    /// Whether generic watchers should hear about this event.
    ///
    /// Description edits and automatic cross-references reach explicitly
    /// mentioned people only; every other variant notifies watchers.
    pub fn notifies_watchers(&self) -> bool {
        match self {
            Self::Changed { change, .. } => !matches!(
                change,
                ChangeData::DescriptionEdit
                    | ChangeData::ReferencedFromComment
                    | ChangeData::ReferencedFromIssue
                    | ChangeData::ReferencedFromMergeRequest
            ),
            Self::Opened { .. } | Self::Commented { .. } => true,
        }
    }
}

/// A committed domain event on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueEvent {
    /// The acting user; `None` for system-generated events.
    pub actor: Option<User>,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
    /// Newly assigned role → group, in assignment order.
    pub new_groups: Vec<(String, Group)>,
    /// Newly assigned role → users, in assignment order.
    pub new_users: Vec<(String, Vec<User>)>,
}

impl IssueEvent {
    pub fn new(actor: Option<User>, kind: EventKind) -> Self {
        Self {
            actor,
            occurred_at: Utc::now(),
            kind,
            new_groups: Vec::new(),
            new_users: Vec::new(),
        }
    }

    /// Attach a role → group assignment carried by this event.
    pub fn with_new_group(mut self, role: impl Into<String>, group: Group) -> Self {
        self.new_groups.push((role.into(), group));
        self
    }

    /// Attach a role → users assignment carried by this event.
    pub fn with_new_users(mut self, role: impl Into<String>, users: Vec<User>) -> Self {
        self.new_users.push((role.into(), users));
        self
    }

    /// Mention-scannable raw markdown, if the variant carries any.
    pub fn markdown(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Opened { markdown } => markdown.as_deref(),
            EventKind::Commented { markdown, .. } => Some(markdown),
            EventKind::Changed { comment, .. } => comment.as_deref(),
        }
    }

    /// Addresses already reached for this event (Commented only).
    pub fn notified_addresses(&self) -> &[String] {
        match &self.kind {
            EventKind::Commented { notified_addresses, .. } => notified_addresses,
            _ => &[],
        }
    }

    /// Human-readable activity phrase, e.g. `commented on issue #3 - Crash`.
    pub fn activity_summary(&self, issue: &Issue) -> String {
        let verb = match &self.kind {
            EventKind::Opened { .. } => "opened issue".to_string(),
            EventKind::Commented { .. } => "commented on issue".to_string(),
            EventKind::Changed { change, .. } => format!("{} of issue", change.summary()),
        };
        format!("{} {}", verb, issue.number_and_title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue::new(Project::new("backend"), 7, "Crash on login", "Open")
    }

    #[test]
    fn threading_reference_falls_back_to_uuid() {
        let issue = issue();
        let reference = issue.threading_reference("tracker.example.com");
        assert_eq!(reference, format!("{}@tracker.example.com", issue.id));
    }

    #[test]
    fn threading_reference_prefers_explicit_key() {
        let mut issue = issue();
        issue.thread_key = Some("issue-7@tracker.example.com".to_string());
        assert_eq!(
            issue.threading_reference("other.example.com"),
            "issue-7@tracker.example.com"
        );
    }

    #[test]
    fn description_edit_does_not_notify_watchers() {
        let kind = EventKind::Changed {
            change: ChangeData::DescriptionEdit,
            comment: None,
        };
        assert!(!kind.notifies_watchers());
    }

    #[test]
    fn cross_references_do_not_notify_watchers() {
        for change in [
            ChangeData::ReferencedFromComment,
            ChangeData::ReferencedFromIssue,
            ChangeData::ReferencedFromMergeRequest,
        ] {
            let kind = EventKind::Changed { change, comment: None };
            assert!(!kind.notifies_watchers());
        }
    }

    #[test]
    fn state_transitions_and_comments_notify_watchers() {
        let changed = EventKind::Changed {
            change: ChangeData::StateTransition {
                from: "Open".to_string(),
                to: "Closed".to_string(),
            },
            comment: None,
        };
        let commented = EventKind::Commented {
            markdown: "done".to_string(),
            notified_addresses: Vec::new(),
        };
        assert!(changed.notifies_watchers());
        assert!(commented.notifies_watchers());
    }

    #[test]
    fn event_markdown_follows_variant() {
        let event = IssueEvent::new(
            None,
            EventKind::Changed {
                change: ChangeData::FieldChange { field: "Priority".to_string() },
                comment: Some("bumping this".to_string()),
            },
        );
        assert_eq!(event.markdown(), Some("bumping this"));

        let event = IssueEvent::new(None, EventKind::Opened { markdown: None });
        assert_eq!(event.markdown(), None);
    }

    #[test]
    fn activity_summary_includes_number_and_title() {
        let issue = issue();
        let event = IssueEvent::new(
            None,
            EventKind::Commented {
                markdown: "hi".to_string(),
                notified_addresses: Vec::new(),
            },
        );
        assert_eq!(
            event.activity_summary(&issue),
            "commented on issue #7 - Crash on login"
        );
    }
}
