//! Error types for the notifications domain.

use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
///
/// Recoverable conditions (malformed saved queries, unknown mention tokens,
/// unresolved user references) are logged and skipped rather than surfaced
/// here; a returned error means the whole event failed and no partial
/// notification state should be committed.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Watch store backend failure.
    #[error("watch store error: {0}")]
    Store(String),

    /// Message template registration or rendering failure.
    #[error("template error: {0}")]
    Template(String),
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        NotificationError::Template(err.to_string())
    }
}
