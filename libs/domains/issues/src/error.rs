use thiserror::Error;

/// Errors produced while parsing a saved query.
///
/// Watch evaluation treats these as recoverable: a malformed saved query is
/// skipped without aborting evaluation for other users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    #[error("empty query")]
    Empty,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' is not applicable in this scope")]
    FieldNotApplicable(String),
}
