//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`UpkeepError`] via `#[from]`. Failures of actions and deliveries are not
//! errors at this level: they are recorded as state on the execution or
//! message they belong to.

/// Top-level error returned by use-cases and ports.
#[derive(Debug, thiserror::Error)]
pub enum UpkeepError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A configuration record violates a domain invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("a rule needs at least one action")]
    NoActions,

    #[error("an event-based trigger needs at least one event")]
    NoEvents,

    #[error("a notification needs at least one channel")]
    NoChannels,

    #[error("a notification needs a template or a body")]
    MissingContent,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(&'static str),

    #[error("invalid quiet hours: {0}")]
    InvalidQuietHours(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("rule {0} is disabled")]
    RuleDisabled(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
