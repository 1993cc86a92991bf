//! # upkeep-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** over the engine façade: rule, template and
//!   recipient CRUD, event intake, execution and message read models, and
//!   the scheduler's timer table
//! - Map HTTP requests into engine calls (driving adapter)
//! - Map [`UpkeepError`](upkeep_domain::error::UpkeepError) into status codes
//!
//! ## Dependency rule
//! Depends on `upkeep-app` (for the engine and port traits) and
//! `upkeep-domain` (for request/response types). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod testing;
