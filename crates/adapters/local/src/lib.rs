//! # upkeep-adapter-local
//!
//! Adapters that need nothing outside the process. They let the daemon run
//! end to end without a mail server, an identity provider or a host
//! application.
//!
//! | Adapter | Port | Behaviour |
//! |---------|------|-----------|
//! | [`LogProvider`] | `NotificationProvider` | Logs each delivery and acknowledges it |
//! | [`StaticDirectory`] | `MemberDirectory` | Group and role membership from configuration |
//! | [`SnapshotCache`] | `EntitySource` | Latest snapshot of every entity seen in an event |
//! | [`LocalCommandSink`] | `CommandSink` | Applies entity commands to the snapshot cache |
//!
//! ## Dependency rule
//!
//! Depends on `upkeep-app` (port traits) and `upkeep-domain` only.

mod command_sink;
mod directory;
mod entities;
mod provider;

pub use command_sink::LocalCommandSink;
pub use directory::StaticDirectory;
pub use entities::SnapshotCache;
pub use provider::LogProvider;
