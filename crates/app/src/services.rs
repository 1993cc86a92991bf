//! Application services — use-case implementations.
//!
//! Each service owns one persisted collection and is the only component that
//! mutates it. Services accept the storage port via a generic parameter
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod automation_rules;
pub mod notification_rules;
pub mod recipients;
pub mod templates;

pub use automation_rules::AutomationRuleService;
pub use notification_rules::NotificationRuleService;
pub use recipients::RecipientService;
pub use templates::TemplateService;
