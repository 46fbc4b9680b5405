//! The recipient fan-out engine.
//!
//! `on_event` is the single entry point, invoked exactly once per committed
//! domain event, inside the same transaction boundary as the event's
//! persistence. The pipeline, in order: apply both saved-query evaluation
//! passes to the watch store, seed the notified-set with the actor, dispatch
//! role-assignment mail, resolve mentions, then compute carbon recipients
//! from stored watches and send one consolidated message.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use domain_issues::{InstanceSettings, Issue, IssueEvent, QueryParser, User};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{MarkupRenderer, PermalinkBuilder, UserDirectory, VisitTracker};
use crate::content::{MessageComposer, RenderedMessage};
use crate::error::NotificationResult;
use crate::gateway::DispatchGateway;
use crate::mention::extract_mentions;
use crate::models::{Dispatch, NotifiedSet};
use crate::query_watch::{self, WatchScope};
use crate::watch_store::WatchStore;

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Mail domain used for reply, unsubscribe, and threading addresses.
    pub mail_domain: String,
    /// Local-part prefix of per-issue reply addresses.
    pub reply_prefix: String,
    /// Local-part prefix of per-issue unsubscribe addresses.
    pub unsubscribe_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            mail_domain: std::env::var("MAIL_DOMAIN")
                .unwrap_or_else(|_| "tracker.localhost".to_string()),
            reply_prefix: std::env::var("MAIL_REPLY_PREFIX")
                .unwrap_or_else(|_| "issue-reply".to_string()),
            unsubscribe_prefix: std::env::var("MAIL_UNSUBSCRIBE_PREFIX")
                .unwrap_or_else(|_| "issue-unsubscribe".to_string()),
        }
    }
}

impl NotificationConfig {
    /// Reply address shared by all dispatches for one issue.
    pub fn reply_address(&self, issue: &Issue) -> String {
        format!("{}+{}@{}", self.reply_prefix, issue.number, self.mail_domain)
    }

    /// Unsubscribe address rendered into carbon/mention mail footers.
    pub fn unsubscribe_address(&self, issue: &Issue) -> String {
        format!("{}+{}@{}", self.unsubscribe_prefix, issue.number, self.mail_domain)
    }
}

/// Collaborators consumed by the service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub watch_store: Arc<dyn WatchStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub parser: Arc<dyn QueryParser>,
    pub markup: Arc<dyn MarkupRenderer>,
    pub permalinks: Arc<dyn PermalinkBuilder>,
    pub visits: Arc<dyn VisitTracker>,
    pub gateway: Arc<dyn DispatchGateway>,
}

/// Service resolving recipients and fanning out notifications per event.
pub struct NotificationService {
    deps: ServiceDeps,
    settings: InstanceSettings,
    config: NotificationConfig,
    composer: MessageComposer,
    /// Per-issue ordering locks: events for the same issue are serialized,
    /// events for different issues proceed concurrently.
    issue_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl NotificationService {
    /// Create a new notification service.
    pub fn new(
        deps: ServiceDeps,
        settings: InstanceSettings,
        config: NotificationConfig,
    ) -> NotificationResult<Self> {
        Ok(Self {
            deps,
            settings,
            config,
            composer: MessageComposer::new()?,
            issue_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Process one committed issue event.
    ///
    /// Watch-store writes and dispatches happen together; an error aborts the
    /// event so the surrounding transaction can roll back as a whole.
    pub async fn on_event(&self, event: &IssueEvent, issue: &Issue) -> NotificationResult<()> {
        let lock = self.issue_lock(issue.id).await;
        let result = {
            let _serialized = lock.lock().await;
            self.fan_out(event, issue).await
        };
        self.release_issue_lock(issue.id, &lock).await;
        result
    }

    async fn fan_out(&self, event: &IssueEvent, issue: &Issue) -> NotificationResult<()> {
        debug!(issue_id = %issue.id, issue = %issue.number_and_title(), "Processing issue event");

        // Both evaluator passes run before fan-out. Global runs second, so a
        // global rule overrides a project-scoped one for the same user; the
        // asymmetry is inherited behavior, kept on purpose.
        let project_scope = WatchScope::project_scope(issue);
        self.apply_scope(&project_scope, issue).await?;
        let users = self.deps.directory.all().await;
        let global_scope = WatchScope::global_scope(&self.settings, &users);
        self.apply_scope(&global_scope, issue).await?;

        let mut notified = NotifiedSet::default();
        if let Some(actor) = &event.actor {
            // Self-suppression; acting on an issue also implies watching it.
            notified.insert(actor.id);
            if !actor.system {
                self.deps.watch_store.set_watch(issue.id, actor.id, true).await?;
            }
        }

        let url = self.deps.permalinks.url_for(issue, event);
        let rendered_body = event.markdown().map(|raw| self.deps.markup.render(raw));
        let reply_to = self.config.reply_address(issue);
        let thread_key = issue.threading_reference(&self.config.mail_domain);

        let activity = match &event.actor {
            Some(actor) => format!("{} {}", actor.display_name, event.activity_summary(issue)),
            None => event.activity_summary(issue),
        };

        // Role-assignment mail carries no unsubscribe footer and fires for
        // every event kind.
        let role_message =
            self.composer.compose(&activity, rendered_body.as_deref(), &url, None)?;
        let notified = self
            .notify_role_assignments(event, issue, &role_message, &reply_to, &thread_key, notified)
            .await?;

        let (mentioned, notified) = self
            .collect_mentions(rendered_body.as_deref(), issue, notified)
            .await?;

        let notify_watchers = event.kind.notifies_watchers();
        if mentioned.is_empty() && !notify_watchers {
            debug!(issue_id = %issue.id, "Event reaches mentioned users only; none found");
            return Ok(());
        }

        let cc_users = self.carbon_recipients(event, issue, &notified).await?;
        if mentioned.is_empty() && cc_users.is_empty() {
            debug!(issue_id = %issue.id, "No recipients left after suppression");
            return Ok(());
        }

        let unsubscribe = self.config.unsubscribe_address(issue);
        let message = self.composer.compose(
            &activity,
            rendered_body.as_deref(),
            &url,
            Some(&unsubscribe),
        )?;
        let dispatch = Dispatch {
            to: collect_addresses(&mentioned),
            cc: collect_addresses(&cc_users),
            subject: format!("[{}] {}", issue.state, activity),
            html_body: message.html,
            text_body: message.text,
            reply_to: Some(reply_to),
            thread_key,
        };
        info!(
            issue_id = %issue.id,
            to = dispatch.to.len(),
            cc = dispatch.cc.len(),
            subject = %dispatch.subject,
            "Sending consolidated notification"
        );
        self.deps.gateway.send(dispatch).await;
        Ok(())
    }

    async fn issue_lock(&self, issue_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.issue_locks.lock().await;
        locks
            .entry(issue_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the issue's lock entry once no other event holds or awaits it.
    /// Two handles mean the map entry plus ours; clones are only taken while
    /// `issue_locks` is held, so the check cannot race a waiter.
    async fn release_issue_lock(&self, issue_id: Uuid, lock: &Arc<Mutex<()>>) {
        let mut locks = self.issue_locks.lock().await;
        if Arc::strong_count(lock) == 2 {
            locks.remove(&issue_id);
        }
    }

    #[cfg(test)]
    async fn issue_lock_count(&self) -> usize {
        self.issue_locks.lock().await.len()
    }

    /// Apply one evaluator pass through the watch store.
    async fn apply_scope(&self, scope: &WatchScope, issue: &Issue) -> NotificationResult<()> {
        for (user_id, watching) in query_watch::evaluate(scope, issue, self.deps.parser.as_ref()) {
            self.deps.watch_store.set_watch(issue.id, user_id, watching).await?;
        }
        Ok(())
    }

    /// One dispatch per newly assigned role, groups first, then user batches.
    /// Everyone addressed is force-watched and marked notified; the acting
    /// user is excluded from the address list only.
    async fn notify_role_assignments(
        &self,
        event: &IssueEvent,
        issue: &Issue,
        message: &RenderedMessage,
        reply_to: &str,
        thread_key: &str,
        mut notified: NotifiedSet,
    ) -> NotificationResult<NotifiedSet> {
        let actor_id = event.actor.as_ref().map(|actor| actor.id);

        let mut batches: Vec<(&str, &[User])> = Vec::new();
        for (role, group) in &event.new_groups {
            batches.push((role.as_str(), &group.members));
        }
        for (role, users) in &event.new_users {
            batches.push((role.as_str(), users));
        }

        for (role, members) in batches {
            let to: BTreeSet<String> = members
                .iter()
                .filter(|member| Some(member.id) != actor_id)
                .filter_map(|member| member.primary_email().map(str::to_string))
                .collect();
            let subject = format!(
                "[{}] You are now \"{}\" of issue {}",
                issue.state,
                role,
                issue.number_and_title()
            );
            info!(issue_id = %issue.id, role, to = to.len(), "Sending role-assignment notification");
            self.deps
                .gateway
                .send(Dispatch {
                    to,
                    cc: BTreeSet::new(),
                    subject,
                    html_body: message.html.clone(),
                    text_body: message.text.clone(),
                    reply_to: Some(reply_to.to_string()),
                    thread_key: thread_key.to_string(),
                })
                .await;

            for member in members {
                self.deps.watch_store.set_watch(issue.id, member.id, true).await?;
                notified.insert(member.id);
            }
        }
        Ok(notified)
    }

    /// Resolve mention tokens against the directory. First mention wins;
    /// unknown names are skipped; each new mention is force-watched.
    async fn collect_mentions(
        &self,
        rendered: Option<&str>,
        issue: &Issue,
        mut notified: NotifiedSet,
    ) -> NotificationResult<(Vec<User>, NotifiedSet)> {
        let mut mentioned = Vec::new();
        if let Some(rendered) = rendered {
            for name in extract_mentions(rendered) {
                match self.deps.directory.find_by_name(&name).await {
                    Some(user) => {
                        if notified.insert(user.id) {
                            self.deps.watch_store.set_watch(issue.id, user.id, true).await?;
                            mentioned.push(user);
                        }
                    }
                    None => warn!(issue_id = %issue.id, mention = %name, "Ignoring mention of unknown user"),
                }
            }
        }
        Ok((mentioned, notified))
    }

    /// Watchers eligible for a carbon copy: watching, not already reached,
    /// have not viewed the issue since the event, and (for comments) none of
    /// their addresses were reached out-of-band.
    async fn carbon_recipients(
        &self,
        event: &IssueEvent,
        issue: &Issue,
        notified: &NotifiedSet,
    ) -> NotificationResult<Vec<User>> {
        let notified_addresses = event.notified_addresses();
        let mut cc_users = Vec::new();
        for watch in self.deps.watch_store.watches(issue.id).await? {
            if !watch.watching || notified.contains(watch.user_id) {
                continue;
            }
            let Some(user) = self.deps.directory.find_by_id(watch.user_id).await else {
                warn!(issue_id = %issue.id, user_id = %watch.user_id, "Skipping watch of unresolvable user");
                continue;
            };
            if let Some(visited_at) = self.deps.visits.last_visit(user.id, issue.id).await {
                if visited_at >= event.occurred_at {
                    continue;
                }
            }
            if notified_addresses.iter().any(|address| user.emails.contains(address)) {
                continue;
            }
            cc_users.push(user);
        }
        Ok(cc_users)
    }
}

fn collect_addresses(users: &[User]) -> BTreeSet<String> {
    users
        .iter()
        .filter_map(|user| user.primary_email().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{PlainMarkup, StaticDirectory, TemplatePermalinks};
    use crate::gateway::MockDispatchGateway;
    use crate::watch_store::InMemoryWatchStore;
    use crate::InMemoryVisitTracker;
    use domain_issues::{ChangeData, EventKind, FilterQueryParser, Project};

    fn test_config() -> NotificationConfig {
        NotificationConfig {
            mail_domain: "tracker.example.com".to_string(),
            reply_prefix: "issue-reply".to_string(),
            unsubscribe_prefix: "issue-unsubscribe".to_string(),
        }
    }

    fn service_with_gateway(
        users: Vec<User>,
        gateway: MockDispatchGateway,
    ) -> NotificationService {
        let deps = ServiceDeps {
            watch_store: Arc::new(InMemoryWatchStore::new()),
            directory: Arc::new(StaticDirectory::new(users)),
            parser: Arc::new(FilterQueryParser::new()),
            markup: Arc::new(PlainMarkup),
            permalinks: Arc::new(TemplatePermalinks::new("https://tracker.example.com")),
            visits: Arc::new(InMemoryVisitTracker::new()),
            gateway: Arc::new(gateway),
        };
        NotificationService::new(deps, InstanceSettings::default(), test_config()).unwrap()
    }

    #[test]
    fn config_derives_per_issue_addresses() {
        let config = test_config();
        let issue = Issue::new(Project::new("backend"), 3, "Crash", "Open");
        assert_eq!(config.reply_address(&issue), "issue-reply+3@tracker.example.com");
        assert_eq!(
            config.unsubscribe_address(&issue),
            "issue-unsubscribe+3@tracker.example.com"
        );
    }

    #[tokio::test]
    async fn description_edit_without_mentions_sends_nothing() {
        let alice = User::new("alice", "Alice", "alice@example.com");
        let bob = User::new("bob", "Bob", "bob@example.com");

        let mut gateway = MockDispatchGateway::new();
        gateway.expect_send().times(0);

        let service = service_with_gateway(vec![alice.clone(), bob.clone()], gateway);
        // Bob watches the issue beforehand.
        let issue = Issue::new(Project::new("backend"), 1, "Crash", "Open");
        service
            .deps
            .watch_store
            .set_watch(issue.id, bob.id, true)
            .await
            .unwrap();

        let event = IssueEvent::new(
            Some(alice),
            EventKind::Changed { change: ChangeData::DescriptionEdit, comment: None },
        );
        service.on_event(&event, &issue).await.unwrap();
    }

    #[tokio::test]
    async fn mentioned_user_is_addressed_directly() {
        let alice = User::new("alice", "Alice", "alice@example.com");
        let bob = User::new("bob", "Bob", "bob@example.com");

        let mut gateway = MockDispatchGateway::new();
        gateway
            .expect_send()
            .withf(|dispatch: &Dispatch| {
                dispatch.to.contains("bob@example.com")
                    && dispatch.cc.is_empty()
                    && dispatch.subject.starts_with("[Open] Alice commented on issue")
            })
            .times(1)
            .return_const(());

        let service = service_with_gateway(vec![alice.clone(), bob], gateway);
        let issue = Issue::new(Project::new("backend"), 2, "Crash", "Open");
        let event = IssueEvent::new(
            Some(alice),
            EventKind::Commented {
                markdown: "@bob can you take a look?".to_string(),
                notified_addresses: Vec::new(),
            },
        );
        service.on_event(&event, &issue).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_mention_is_skipped_without_failing() {
        let alice = User::new("alice", "Alice", "alice@example.com");

        let mut gateway = MockDispatchGateway::new();
        gateway.expect_send().times(0);

        let service = service_with_gateway(vec![alice.clone()], gateway);
        let issue = Issue::new(Project::new("backend"), 5, "Crash", "Open");
        let event = IssueEvent::new(
            Some(alice),
            EventKind::Commented {
                markdown: "pinging @ghost123".to_string(),
                notified_addresses: Vec::new(),
            },
        );
        service.on_event(&event, &issue).await.unwrap();
    }

    #[tokio::test]
    async fn actor_is_force_watched_but_never_notified() {
        let alice = User::new("alice", "Alice", "alice@example.com");

        let mut gateway = MockDispatchGateway::new();
        gateway.expect_send().times(0);

        let store = InMemoryWatchStore::new();
        let deps = ServiceDeps {
            watch_store: Arc::new(store.clone()),
            directory: Arc::new(StaticDirectory::new(vec![alice.clone()])),
            parser: Arc::new(FilterQueryParser::new()),
            markup: Arc::new(PlainMarkup),
            permalinks: Arc::new(TemplatePermalinks::new("https://tracker.example.com")),
            visits: Arc::new(InMemoryVisitTracker::new()),
            gateway: Arc::new(gateway),
        };
        let service =
            NotificationService::new(deps, InstanceSettings::default(), test_config()).unwrap();

        let issue = Issue::new(Project::new("backend"), 6, "Crash", "Open");
        let event = IssueEvent::new(
            Some(alice.clone()),
            EventKind::Commented {
                markdown: "mentioning myself, @alice".to_string(),
                notified_addresses: Vec::new(),
            },
        );
        service.on_event(&event, &issue).await.unwrap();

        assert_eq!(store.watch_flag(issue.id, alice.id).await, Some(true));
    }

    #[tokio::test]
    async fn issue_lock_entries_are_dropped_after_processing() {
        let alice = User::new("alice", "Alice", "alice@example.com");
        let bob = User::new("bob", "Bob", "bob@example.com");

        let mut gateway = MockDispatchGateway::new();
        gateway.expect_send().return_const(());

        let service = service_with_gateway(vec![alice.clone(), bob.clone()], gateway);
        let first = Issue::new(Project::new("backend"), 11, "Crash", "Open");
        let second = Issue::new(Project::new("backend"), 12, "Hang", "Open");
        for issue in [&first, &second] {
            service.deps.watch_store.set_watch(issue.id, bob.id, true).await.unwrap();
            let event = IssueEvent::new(
                Some(alice.clone()),
                EventKind::Commented {
                    markdown: "still reproducible".to_string(),
                    notified_addresses: Vec::new(),
                },
            );
            service.on_event(&event, issue).await.unwrap();
        }

        assert_eq!(service.issue_lock_count().await, 0);
    }

    #[tokio::test]
    async fn system_actor_is_suppressed_but_not_watched() {
        let mut bot = User::new("bot", "Tracker Bot", "bot@example.com");
        bot.system = true;

        let mut gateway = MockDispatchGateway::new();
        gateway.expect_send().times(0);

        let store = InMemoryWatchStore::new();
        let deps = ServiceDeps {
            watch_store: Arc::new(store.clone()),
            directory: Arc::new(StaticDirectory::new(vec![bot.clone()])),
            parser: Arc::new(FilterQueryParser::new()),
            markup: Arc::new(PlainMarkup),
            permalinks: Arc::new(TemplatePermalinks::new("https://tracker.example.com")),
            visits: Arc::new(InMemoryVisitTracker::new()),
            gateway: Arc::new(gateway),
        };
        let service =
            NotificationService::new(deps, InstanceSettings::default(), test_config()).unwrap();

        let issue = Issue::new(Project::new("backend"), 8, "Crash", "Open");
        let event = IssueEvent::new(
            Some(bot.clone()),
            EventKind::Changed {
                change: ChangeData::FieldChange { field: "Priority".to_string() },
                comment: None,
            },
        );
        service.on_event(&event, &issue).await.unwrap();

        assert_eq!(store.watch_flag(issue.id, bot.id).await, None);
    }
}
