//! Recipient catalog — contact details and preferences for known users,
//! groups and roles.

use std::sync::Arc;

use upkeep_domain::error::{NotFoundError, UpkeepError};
use upkeep_domain::notification::NotificationRecipient;

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "notification_recipients";

fn not_found(id: &str) -> UpkeepError {
    NotFoundError {
        entity: "NotificationRecipient",
        id: id.to_string(),
    }
    .into()
}

pub struct RecipientService<S> {
    recipients: Collection<S, NotificationRecipient>,
}

impl<S: KeyValueStore + Send + Sync> RecipientService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            recipients: Collection::new(store, COLLECTION_KEY),
        }
    }

    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        self.recipients.load().await
    }

    /// Insert or replace the recipient with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::Validation`] for an invalid recipient, or a
    /// storage error.
    #[tracing::instrument(skip(self, recipient), fields(recipient_id = %recipient.id))]
    pub async fn save_recipient(
        &self,
        recipient: NotificationRecipient,
    ) -> Result<NotificationRecipient, UpkeepError> {
        recipient.validate()?;
        self.recipients
            .mutate(|recipients| {
                match recipients.iter_mut().find(|r| r.id == recipient.id) {
                    Some(slot) => *slot = recipient.clone(),
                    None => recipients.push(recipient.clone()),
                }
                Ok(recipient)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] when no recipient with `id` exists.
    pub async fn get_recipient(&self, id: &str) -> Result<NotificationRecipient, UpkeepError> {
        self.find(id).await.ok_or_else(|| not_found(id))
    }

    /// The recipient with `id`, if the catalog knows it.
    pub async fn find(&self, id: &str) -> Option<NotificationRecipient> {
        self.recipients.find(|r| r.id == id).await
    }

    pub async fn list_recipients(&self) -> Vec<NotificationRecipient> {
        self.recipients.all().await
    }

    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_recipient(&self, id: &str) -> Result<(), UpkeepError> {
        self.recipients
            .mutate(|recipients| {
                let before = recipients.len();
                recipients.retain(|r| r.id != id);
                if recipients.len() == before {
                    return Err(not_found(id));
                }
                Ok(())
            })
            .await
    }
}
