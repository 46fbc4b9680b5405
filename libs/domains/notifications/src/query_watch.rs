//! Saved-query watch evaluation.
//!
//! Each event triggers two evaluation passes, one per scope. A scope is an
//! explicit parameter struct (not a runtime-built closure): the project scope
//! carries the project's shared queries and its per-user settings, the global
//! scope carries instance-wide shared queries and every user's personal
//! queries. Within a scope, queries evaluate in declared order and the last
//! matching query per user wins.

use domain_issues::{InstanceSettings, Issue, QueryParser, User};
use tracing::warn;
use uuid::Uuid;

/// One saved query attributed to the user whose watch state it drives.
#[derive(Debug, Clone)]
pub struct ScopedQuery {
    pub owner: User,
    pub query: String,
    /// Intent on match: watch (`true`) or stop watching (`false`).
    pub watch: bool,
}

/// Evaluator configuration for one scope.
#[derive(Debug, Clone)]
pub struct WatchScope {
    /// `Some` for the project scope, `None` for the instance-global scope;
    /// passed through to the query parser.
    pub project: Option<Uuid>,
    /// Queries in evaluation order.
    pub queries: Vec<ScopedQuery>,
}

impl WatchScope {
    /// The project scope of an issue: the project's named queries (expanded
    /// per subscriber), then its per-user saved queries.
    pub fn project_scope(issue: &Issue) -> Self {
        let mut queries = Vec::new();
        for named in &issue.project.named_queries {
            for subscriber in &named.subscribers {
                queries.push(ScopedQuery {
                    owner: subscriber.clone(),
                    query: named.query.clone(),
                    watch: named.watch,
                });
            }
        }
        for setting in &issue.project.query_settings {
            for saved in &setting.queries {
                queries.push(ScopedQuery {
                    owner: setting.user.clone(),
                    query: saved.query.clone(),
                    watch: saved.watch,
                });
            }
        }
        Self { project: Some(issue.project.id), queries }
    }

    /// The instance-global scope: globally named queries (expanded per
    /// subscriber), then every user's personal queries.
    pub fn global_scope(settings: &InstanceSettings, users: &[User]) -> Self {
        let mut queries = Vec::new();
        for named in &settings.named_queries {
            for subscriber in &named.subscribers {
                queries.push(ScopedQuery {
                    owner: subscriber.clone(),
                    query: named.query.clone(),
                    watch: named.watch,
                });
            }
        }
        for user in users {
            for saved in &user.personal_queries {
                queries.push(ScopedQuery {
                    owner: user.clone(),
                    query: saved.query.clone(),
                    watch: saved.watch,
                });
            }
        }
        Self { project: None, queries }
    }
}

/// Evaluate a scope against an issue.
///
/// Returns per-user watch intents in first-match order, later matching
/// queries overwriting earlier ones. Malformed queries are logged and
/// skipped; they never abort evaluation for other users.
pub fn evaluate(
    scope: &WatchScope,
    issue: &Issue,
    parser: &dyn QueryParser,
) -> Vec<(Uuid, bool)> {
    let mut intents: Vec<(Uuid, bool)> = Vec::new();
    for scoped in &scope.queries {
        let parsed = match parser.parse(scope.project, &scoped.query) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(
                    owner = %scoped.owner.name,
                    query = %scoped.query,
                    %error,
                    "Skipping malformed saved query"
                );
                continue;
            }
        };
        if parsed.matches(issue) {
            match intents.iter_mut().find(|(id, _)| *id == scoped.owner.id) {
                Some(intent) => intent.1 = scoped.watch,
                None => intents.push((scoped.owner.id, scoped.watch)),
            }
        }
    }
    intents
}
