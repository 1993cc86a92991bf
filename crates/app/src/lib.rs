//! # upkeep-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `KeyValueStore` — whole-collection JSON persistence
//!   - `EntitySource` — enumerate the host's entities for scheduled runs
//!   - `MemberDirectory` — expand groups and roles into user ids
//!   - `NotificationProvider` — deliver a message on one channel
//!   - `CommandSink` — hand entity commands back to the host
//! - Define **driving/inbound use-cases**:
//!   - rule, template and recipient services (CRUD + validation)
//!   - `AutomationEngine` — run a rule's action pipeline for one entity
//!   - `Dispatcher` — build, queue, deliver and retry notifications
//!   - `Scheduler` — one timer per enabled time-based rule
//!   - `Router` — fan events, timer fires and condition ticks out to rules
//!   - `Engine` — the single composed instance and its background loops
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `upkeep-domain` only (plus `tokio` for tasks, channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod actions;
pub mod automation_engine;
pub mod collection;
pub mod dispatcher;
pub mod engine;
pub mod event_bus;
pub mod execution_log;
pub mod message_queue;
pub mod ports;
pub mod router;
pub mod scheduler;
pub mod services;

#[cfg(test)]
mod testing;
