//! Issues Domain
//!
//! Data model for tracked issues and the saved-query engine used to derive
//! watch state from them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Events    │  ← IssueEvent: tagged union of domain activity
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Issue, User, Group, Project, saved queries
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Queries   │  ← QueryParser trait + filter grammar
//! └─────────────┘
//! ```
//!
//! Consumers (notably `domain_notifications`) treat query parsing as a seam:
//! `QueryParser` is a trait, and `FilterQueryParser` is the stock
//! implementation shipped here.

pub mod error;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use error::QueryParseError;
pub use models::{
    ChangeData, EventKind, Group, InstanceSettings, Issue, IssueEvent, IssueWatch, NamedQuery,
    Project, SavedQuery, User, UserQuerySetting,
};
pub use query::{FilterQueryParser, IssueQuery, QueryParser};
