//! Notifications — rules, templates, recipients and queued messages.

mod channel;
mod message;
mod recipient;
mod rule;
mod template;

pub use channel::{Channel, Priority, UnknownChannel};
pub use message::{
    DEFAULT_MAX_RETRIES, FailureOutcome, MessageMetadata, MessageOrigin, MessageStatus,
    NotificationMessage, NotificationStats, RetryPolicy,
};
pub use recipient::{
    NotificationRecipient, QuietHours, RecipientKind, RecipientPreferences,
};
pub use rule::{NotificationRule, NotificationRuleBuilder, NotificationScheduling, RecipientSpec};
pub use template::NotificationTemplate;
