//! Event bus port — publish/subscribe for domain events.

use std::future::Future;

use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::DomainEvent;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: DomainEvent) -> impl Future<Output = Result<(), UpkeepError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: DomainEvent) -> impl Future<Output = Result<(), UpkeepError>> + Send {
        (**self).publish(event)
    }
}
