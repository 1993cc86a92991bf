//! Log provider — "delivers" by writing the message to the log.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use upkeep_app::ports::{Delivery, NotificationProvider, ProviderResponse};

/// A provider for channels with no real gateway configured.
#[derive(Debug, Default)]
pub struct LogProvider {
    delivered: AtomicUsize,
}

impl LogProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries acknowledged so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationProvider for LogProvider {
    async fn send(&self, delivery: &Delivery) -> ProviderResponse {
        let recipients: Vec<&str> = delivery.targets.iter().map(|t| t.id.as_str()).collect();
        tracing::info!(
            message_id = %delivery.message_id,
            channel = %delivery.channel,
            priority = ?delivery.priority,
            recipients = ?recipients,
            subject = delivery.subject.as_deref().unwrap_or_default(),
            "notification delivered to log"
        );
        tracing::debug!(message_id = %delivery.message_id, body = %delivery.body);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        ProviderResponse::accepted(format!("local-{}", uuid::Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upkeep_app::ports::DeliveryTarget;
    use upkeep_domain::id::MessageId;
    use upkeep_domain::notification::{Channel, Priority};

    fn delivery() -> Delivery {
        Delivery {
            message_id: MessageId::new(),
            channel: Channel::Email,
            targets: vec![DeliveryTarget {
                id: "u-1".to_string(),
                address: None,
            }],
            subject: Some("Filter change due".to_string()),
            body: "Replace the AHU-3 filter".to_string(),
            priority: Priority::Normal,
            is_html: false,
        }
    }

    #[tokio::test]
    async fn should_acknowledge_with_generated_id() {
        let provider = LogProvider::new();

        let first = provider.send(&delivery()).await;
        let second = provider.send(&delivery()).await;

        assert!(first.success);
        assert!(first.message_id.as_deref().unwrap().starts_with("local-"));
        assert_ne!(first.message_id, second.message_id);
        assert_eq!(provider.delivered(), 2);
    }
}
