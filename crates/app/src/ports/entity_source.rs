//! Entity source port — how scheduled and condition-based rules find the
//! entities they run against.

use std::future::Future;

use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;

/// Enumerates the host application's entities.
///
/// The engine never owns work orders, assets or requests; it asks for
/// their current snapshots whenever a rule fires without an event.
pub trait EntitySource {
    /// Current snapshot of every entity rules may run against.
    fn list_entities(&self) -> impl Future<Output = Result<Vec<EntitySnapshot>, UpkeepError>> + Send;

    /// Called with the snapshot carried by every emitted event, so a caching
    /// source can keep itself current. Does nothing by default.
    fn observe(&self, snapshot: EntitySnapshot) -> impl Future<Output = ()> + Send {
        let _ = snapshot;
        async {}
    }
}

impl<T: EntitySource + Send + Sync> EntitySource for std::sync::Arc<T> {
    fn list_entities(&self) -> impl Future<Output = Result<Vec<EntitySnapshot>, UpkeepError>> + Send {
        (**self).list_entities()
    }

    fn observe(&self, snapshot: EntitySnapshot) -> impl Future<Output = ()> + Send {
        (**self).observe(snapshot)
    }
}
