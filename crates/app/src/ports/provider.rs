//! Notification provider port — the gateway behind one channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use upkeep_domain::id::MessageId;
use upkeep_domain::notification::{Channel, Priority};

/// One recipient of a delivery, with the address the channel needs when
/// the recipient is known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
}

/// Everything a provider needs to deliver one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: MessageId,
    pub channel: Channel,
    pub targets: Vec<DeliveryTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub priority: Priority,
    #[serde(default)]
    pub is_html: bool,
}

/// A provider's answer to a send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResponse {
    #[must_use]
    pub fn accepted(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Delivers messages on one channel (SMTP, SMS gateway, Slack, …).
///
/// Implementations report failures through [`ProviderResponse`] rather than
/// panicking; the dispatcher bounds every call with a timeout.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, delivery: &Delivery) -> ProviderResponse;
}
