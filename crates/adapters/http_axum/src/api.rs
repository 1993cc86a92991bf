//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod automation_rules;
#[allow(clippy::missing_errors_doc)]
pub mod events;
#[allow(clippy::missing_errors_doc)]
pub mod executions;
#[allow(clippy::missing_errors_doc)]
pub mod messages;
#[allow(clippy::missing_errors_doc)]
pub mod notification_rules;
#[allow(clippy::missing_errors_doc)]
pub mod recipients;
pub mod scheduler;
#[allow(clippy::missing_errors_doc)]
pub mod templates;

use axum::Router;
use axum::routing::{get, post, put};

use upkeep_app::ports::{EntitySource, KeyValueStore};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<S, E>() -> Router<AppState<S, E>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Router::new()
        // Automation rules
        .route(
            "/automation-rules",
            get(automation_rules::list::<S, E>).post(automation_rules::create::<S, E>),
        )
        .route(
            "/automation-rules/{id}",
            get(automation_rules::get::<S, E>)
                .put(automation_rules::update::<S, E>)
                .delete(automation_rules::delete::<S, E>),
        )
        .route(
            "/automation-rules/{id}/enabled",
            put(automation_rules::set_enabled::<S, E>),
        )
        .route("/automation-rules/{id}/run", post(automation_rules::run::<S, E>))
        // Notification rules
        .route(
            "/notification-rules",
            get(notification_rules::list::<S, E>).post(notification_rules::create::<S, E>),
        )
        .route(
            "/notification-rules/{id}",
            get(notification_rules::get::<S, E>)
                .put(notification_rules::update::<S, E>)
                .delete(notification_rules::delete::<S, E>),
        )
        // Templates
        .route(
            "/templates",
            get(templates::list::<S, E>).post(templates::create::<S, E>),
        )
        .route(
            "/templates/{id}",
            get(templates::get::<S, E>)
                .put(templates::update::<S, E>)
                .delete(templates::delete::<S, E>),
        )
        // Recipients
        .route(
            "/recipients",
            get(recipients::list::<S, E>).post(recipients::save::<S, E>),
        )
        .route(
            "/recipients/{id}",
            get(recipients::get::<S, E>)
                .put(recipients::replace::<S, E>)
                .delete(recipients::delete::<S, E>),
        )
        // Events
        .route("/events", post(events::emit::<S, E>))
        // Executions
        .route("/executions", get(executions::list::<S, E>))
        .route("/executions/stats", get(executions::stats::<S, E>))
        .route("/executions/{id}", get(executions::get::<S, E>))
        // Messages
        .route(
            "/messages",
            get(messages::list::<S, E>).post(messages::send::<S, E>),
        )
        .route("/messages/stats", get(messages::stats::<S, E>))
        .route("/messages/{id}", get(messages::get::<S, E>))
        .route("/messages/{id}/read", post(messages::mark_read::<S, E>))
        // Scheduler
        .route("/scheduler/timers", get(scheduler::timers::<S, E>))
}
