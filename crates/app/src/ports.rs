//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.
//!
//! Persistence and entity enumeration are resolved at compile time through
//! generics. Providers, directories and command sinks are swapped at runtime
//! and are therefore object-safe `async_trait`s.

pub mod command_sink;
pub mod directory;
pub mod entity_source;
pub mod event_bus;
pub mod provider;
pub mod storage;

pub use command_sink::{CommandError, CommandSink, EntityCommand};
pub use directory::{EmptyDirectory, MemberDirectory};
pub use entity_source::EntitySource;
pub use event_bus::EventPublisher;
pub use provider::{Delivery, DeliveryTarget, NotificationProvider, ProviderResponse};
pub use storage::KeyValueStore;
