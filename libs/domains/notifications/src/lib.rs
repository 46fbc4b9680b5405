//! Notifications Domain
//!
//! Recipient resolution and notification fan-out for issue events: given a
//! committed domain event, compute the exact, deduplicated set of people to
//! notify, decide per-recipient channel (direct "To" vs. carbon "Cc"), and
//! build the message content once per event.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ NotificationSvc  │  ← on_event: the fan-out pipeline
//! └───┬──────────┬───┘
//!     │          │
//! ┌───▼────┐ ┌───▼─────────┐
//! │ Watch  │ │ Saved-query │  ← watch store + per-scope evaluation
//! │ store  │ │ evaluation  │
//! └───┬────┘ └───┬─────────┘
//!     │          │
//! ┌───▼──────────▼───┐
//! │  Collaborators   │  ← directory, markup, permalinks, visits, gateway
//! └──────────────────┘
//! ```
//!
//! Watch state is the only durable side effect owned here; delivery is
//! fire-and-forget through [`gateway::DispatchGateway`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{NotificationConfig, NotificationService};
//!
//! let service = NotificationService::new(deps, settings, NotificationConfig::default())?;
//! service.on_event(&event, &issue).await?;
//! ```

pub mod collaborators;
pub mod content;
pub mod error;
pub mod gateway;
pub mod mention;
pub mod models;
pub mod query_watch;
pub mod service;
pub mod watch_store;

// Re-export commonly used types
pub use collaborators::{
    InMemoryVisitTracker, MarkupRenderer, PermalinkBuilder, PlainMarkup, StaticDirectory,
    TemplatePermalinks, UserDirectory, VisitTracker,
};
pub use content::{MessageComposer, RenderedMessage};
pub use error::{NotificationError, NotificationResult};
pub use gateway::{DispatchGateway, RecordingGateway};
pub use mention::extract_mentions;
pub use models::{Dispatch, NotifiedSet};
pub use query_watch::{ScopedQuery, WatchScope};
pub use service::{NotificationConfig, NotificationService, ServiceDeps};
pub use watch_store::{InMemoryWatchStore, WatchStore};
