//! # upkeep-domain
//!
//! Pure domain model for the upkeep maintenance automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Automation rules** (trigger → conditions → ordered actions)
//! - Define **Executions** (one run of a rule's action pipeline)
//! - Define **Notifications** (rules, templates, recipients, queued messages)
//! - Define **Events** (what the host application emits into the engine)
//! - Provide the pure evaluators: condition matching, template rendering,
//!   recurrence and schedule arithmetic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod path;
pub mod time;

pub mod automation;
pub mod condition;
pub mod event;
pub mod execution;
pub mod notification;
pub mod recurrence;
pub mod template;
