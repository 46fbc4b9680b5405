//! Data models for the notifications domain.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One outgoing message, ready for the dispatch gateway.
///
/// `to` and `cc` are disjoint within one event by construction: a user enters
/// the carbon set only if no earlier pass already reached them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Directly addressed recipients (mentioned or role-assigned).
    pub to: BTreeSet<String>,
    /// Carbon recipients (watchers notified passively).
    pub cc: BTreeSet<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// Reply address shared by all dispatches for one event.
    pub reply_to: Option<String>,
    /// Threading key grouping all mail about the same issue.
    pub thread_key: String,
}

/// Accumulator of users already reached while processing one event.
///
/// Threaded through the fan-out passes; membership here is what keeps the
/// direct and carbon recipient sets disjoint.
#[derive(Debug, Default, Clone)]
pub struct NotifiedSet(HashSet<Uuid>);

impl NotifiedSet {
    /// Record a user as reached. Returns `true` if the user was not already
    /// in the set, mirroring first-mention-wins semantics.
    pub fn insert(&mut self, user_id: Uuid) -> bool {
        self.0.insert(user_id)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.0.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notified_set_insert_reports_first_insertion() {
        let mut notified = NotifiedSet::default();
        let user = Uuid::new_v4();
        assert!(notified.insert(user));
        assert!(!notified.insert(user));
        assert!(notified.contains(user));
        assert_eq!(notified.len(), 1);
    }
}
