//! In-process event bus — how `emit` reaches the router without waiting
//! for any rule to run.

use std::future::Future;

use tokio::sync::broadcast;

use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::DomainEvent;

use crate::ports::EventPublisher;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast channel of [`DomainEvent`]s.
///
/// Publishing never blocks and succeeds with no subscribers. A subscriber
/// that falls more than `capacity` events behind loses the oldest ones and
/// is told how many it missed.
pub struct InProcessEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: DomainEvent) -> impl Future<Output = Result<(), UpkeepError>> + Send {
        if self.sender.send(event).is_err() {
            tracing::debug!("event published with no subscribers");
        }
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::RecvError;
    use upkeep_domain::event::{EntitySnapshot, names};

    fn event(id: &str) -> DomainEvent {
        DomainEvent::new(
            names::WORK_ORDER_CREATED,
            EntitySnapshot::new(id, "work_order", json!({"priority": "high"})),
        )
    }

    #[tokio::test]
    async fn should_fan_out_to_every_subscriber() {
        let bus = InProcessEventBus::default();
        let mut router = bus.subscribe();
        let mut audit = bus.subscribe();
        assert_eq!(bus.subscribers(), 2);

        bus.publish(event("wo-1")).await.unwrap();

        assert_eq!(router.recv().await.unwrap().entity.id, "wo-1");
        assert_eq!(audit.recv().await.unwrap().entity.id, "wo-1");
    }

    #[tokio::test]
    async fn should_accept_events_without_subscribers() {
        let bus = InProcessEventBus::new(4);
        assert!(bus.publish(event("wo-1")).await.is_ok());
    }

    #[tokio::test]
    async fn should_only_see_events_after_subscribing() {
        let bus = InProcessEventBus::new(4);
        bus.publish(event("early")).await.unwrap();
        let mut rx = bus.subscribe();
        bus.publish(event("late")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().entity.id, "late");
    }

    #[tokio::test]
    async fn should_report_lag_when_subscriber_falls_behind() {
        let bus = InProcessEventBus::new(2);
        let mut rx = bus.subscribe();
        for id in ["a", "b", "c"] {
            bus.publish(event(id)).await.unwrap();
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().entity.id, "b");
    }
}
