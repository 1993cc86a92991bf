//! Message queue — every notification message and its delivery state.
//!
//! Producers (rule firings, API sends) enqueue concurrently; the drain loop
//! claims due messages one at a time. A claimed message is in flight until
//! it is released with its new state, and cannot be claimed again meanwhile.
//!
//! The queue keeps at most `max_retained` messages. Enqueueing past the
//! bound drops the oldest settled (non-pending) messages; pending messages
//! are never dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use upkeep_domain::error::{NotFoundError, UpkeepError};
use upkeep_domain::id::MessageId;
use upkeep_domain::notification::{
    Channel, MessageStatus, NotificationMessage, NotificationStats,
};
use upkeep_domain::time::Timestamp;

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "notification_messages";
pub const DEFAULT_MAX_RETAINED: usize = 10_000;

fn not_found(id: MessageId) -> UpkeepError {
    NotFoundError {
        entity: "NotificationMessage",
        id: id.to_string(),
    }
    .into()
}

/// Drop the oldest settled messages until at most `max` remain.
fn prune(queue: &mut Vec<NotificationMessage>, max: usize) -> usize {
    let excess = queue.len().saturating_sub(max);
    if excess == 0 {
        return 0;
    }
    let mut settled: Vec<(Timestamp, MessageId)> = queue
        .iter()
        .filter(|m| m.status != MessageStatus::Pending)
        .map(|m| (m.created_at, m.id))
        .collect();
    settled.sort_by_key(|(created_at, _)| *created_at);
    let dropped: HashSet<MessageId> = settled.into_iter().take(excess).map(|(_, id)| id).collect();
    queue.retain(|m| !dropped.contains(&m.id));
    dropped.len()
}

pub struct MessageQueue<S> {
    messages: Collection<S, NotificationMessage>,
    in_flight: Mutex<HashSet<MessageId>>,
    max_retained: usize,
}

impl<S: KeyValueStore + Send + Sync> MessageQueue<S> {
    pub fn new(store: Arc<S>, max_retained: usize) -> Self {
        Self {
            messages: Collection::new(store, COLLECTION_KEY),
            in_flight: Mutex::new(HashSet::new()),
            max_retained: max_retained.max(1),
        }
    }

    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        self.messages.load().await
    }

    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be saved.
    pub async fn enqueue(&self, messages: Vec<NotificationMessage>) -> Result<(), UpkeepError> {
        if messages.is_empty() {
            return Ok(());
        }
        let max_retained = self.max_retained;
        let pruned = self
            .messages
            .mutate(|queue| {
                queue.extend(messages);
                Ok(prune(queue, max_retained))
            })
            .await?;
        if pruned > 0 {
            tracing::debug!(pruned, "dropped oldest settled messages");
        }
        Ok(())
    }

    pub async fn get(&self, id: MessageId) -> Option<NotificationMessage> {
        self.messages.find(|m| m.id == id).await
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<MessageId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a due message for delivery, or `None` if it is not due, not
    /// pending, unknown, or already claimed.
    pub async fn claim(&self, id: MessageId, now: Timestamp) -> Option<NotificationMessage> {
        let message = self.get(id).await?;
        if !message.is_due(now) {
            return None;
        }
        self.in_flight().insert(id).then_some(message)
    }

    /// Store the new state of a claimed message and release the claim.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be saved. The claim is
    /// released either way.
    pub async fn release(&self, message: NotificationMessage) -> Result<(), UpkeepError> {
        let id = message.id;
        let result = self
            .messages
            .mutate(|queue| {
                let slot = queue.iter_mut().find(|m| m.id == id).ok_or_else(|| not_found(id))?;
                *slot = message;
                Ok(())
            })
            .await;
        self.in_flight().remove(&id);
        result
    }

    /// Ids of due, unclaimed messages grouped by channel, at most `cap`
    /// per channel, most urgent and then oldest first.
    pub async fn due_by_channel(&self, now: Timestamp, cap: usize) -> BTreeMap<Channel, Vec<MessageId>> {
        let mut due = self.messages.filter(|m| m.is_due(now)).await;
        {
            let claimed = self.in_flight();
            due.retain(|m| !claimed.contains(&m.id));
        }
        due.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        let mut grouped: BTreeMap<Channel, Vec<MessageId>> = BTreeMap::new();
        for message in due {
            let ids = grouped.entry(message.channel).or_default();
            if ids.len() < cap {
                ids.push(message.id);
            }
        }
        grouped
    }

    /// Fail every unclaimed pending message whose retry window has passed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be saved.
    pub async fn expire_overdue(&self, now: Timestamp) -> Result<usize, UpkeepError> {
        let overdue = self
            .messages
            .filter(|m| {
                m.status == MessageStatus::Pending && m.retry_deadline.is_some_and(|d| now > d)
            })
            .await;
        if overdue.is_empty() {
            return Ok(0);
        }
        let claimed: HashSet<MessageId> = self.in_flight().clone();
        self.messages
            .mutate(|queue| {
                let mut expired = 0;
                for message in queue.iter_mut().filter(|m| !claimed.contains(&m.id)) {
                    if message.expire_if_past_deadline(now) {
                        tracing::warn!(message_id = %message.id, channel = %message.channel, "retry window expired");
                        expired += 1;
                    }
                }
                Ok(expired)
            })
            .await
    }

    /// Apply `change` to one message and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown id, or a storage error.
    pub async fn update_with(
        &self,
        id: MessageId,
        change: impl FnOnce(&mut NotificationMessage),
    ) -> Result<NotificationMessage, UpkeepError> {
        self.messages
            .mutate(|queue| {
                let slot = queue.iter_mut().find(|m| m.id == id).ok_or_else(|| not_found(id))?;
                change(slot);
                Ok(slot.clone())
            })
            .await
    }

    /// Most recent messages first.
    pub async fn list(&self, limit: usize) -> Vec<NotificationMessage> {
        let mut messages = self.messages.all().await;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        messages
    }

    pub async fn stats(&self) -> NotificationStats {
        NotificationStats::from_messages(self.messages.all().await.iter())
    }

    /// Messages addressed to `recipient` created at or after `since` that
    /// have not failed. Used for per-recipient rate limits.
    pub async fn recent_count(&self, recipient: &str, since: Timestamp) -> usize {
        self.messages
            .filter(|m| {
                m.created_at >= since
                    && m.status != MessageStatus::Failed
                    && m.recipients.iter().any(|r| r == recipient)
            })
            .await
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use chrono::TimeDelta;
    use upkeep_domain::notification::{Priority, RetryPolicy};
    use upkeep_domain::time;

    fn queue() -> MessageQueue<InMemoryStore> {
        MessageQueue::new(Arc::new(InMemoryStore::default()), DEFAULT_MAX_RETAINED)
    }

    fn message(channel: Channel) -> NotificationMessage {
        NotificationMessage::new(channel, vec!["u1".to_string()], "body", time::now())
    }

    #[tokio::test]
    async fn should_claim_due_message_only_once() {
        let q = queue();
        let m = message(Channel::Email);
        let id = m.id;
        q.enqueue(vec![m]).await.unwrap();

        let now = time::now();
        let claimed = q.claim(id, now).await.unwrap();
        assert!(q.claim(id, now).await.is_none());
        assert!(q.due_by_channel(now, 10).await.is_empty());

        q.release(claimed).await.unwrap();
        assert!(q.claim(id, now).await.is_some());
    }

    #[tokio::test]
    async fn should_not_claim_future_message() {
        let q = queue();
        let mut m = message(Channel::Sms);
        let now = time::now();
        m.scheduled_for = Some(now + TimeDelta::minutes(5));
        let id = m.id;
        q.enqueue(vec![m]).await.unwrap();
        assert!(q.claim(id, now).await.is_none());
        assert!(q.claim(id, now + TimeDelta::minutes(5)).await.is_some());
    }

    #[tokio::test]
    async fn should_group_due_messages_by_channel_with_cap() {
        let q = queue();
        let mut urgent = message(Channel::Email);
        urgent.priority = Priority::Urgent;
        let urgent_id = urgent.id;
        q.enqueue(vec![message(Channel::Email), urgent, message(Channel::Email), message(Channel::Slack)])
            .await
            .unwrap();

        let due = q.due_by_channel(time::now(), 2).await;
        assert_eq!(due[&Channel::Email].len(), 2);
        assert_eq!(due[&Channel::Email][0], urgent_id);
        assert_eq!(due[&Channel::Slack].len(), 1);
    }

    #[tokio::test]
    async fn should_expire_overdue_retries() {
        let q = queue();
        let mut m = message(Channel::Sms);
        let past = time::now() - TimeDelta::hours(2);
        m.record_failure("down", past, &RetryPolicy::default());
        let id = m.id;
        q.enqueue(vec![m]).await.unwrap();

        assert_eq!(q.expire_overdue(time::now()).await.unwrap(), 1);
        let stored = q.get(id).await.unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("retry window expired"));
    }

    #[tokio::test]
    async fn should_list_newest_first_with_limit() {
        let q = queue();
        let mut old = message(Channel::Email);
        old.created_at = time::now() - TimeDelta::hours(1);
        let newest = message(Channel::Email);
        let newest_id = newest.id;
        q.enqueue(vec![old, newest]).await.unwrap();

        let listed = q.list(1).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newest_id);
    }

    #[tokio::test]
    async fn should_count_recent_messages_per_recipient() {
        let q = queue();
        let mut failed = message(Channel::Email);
        failed.status = MessageStatus::Failed;
        q.enqueue(vec![message(Channel::Email), message(Channel::Sms), failed])
            .await
            .unwrap();
        let since = time::now() - TimeDelta::hours(1);
        assert_eq!(q.recent_count("u1", since).await, 2);
        assert_eq!(q.recent_count("u2", since).await, 0);
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_update() {
        let q = queue();
        let result = q.update_with(MessageId::new(), |_| {}).await;
        assert!(matches!(result, Err(UpkeepError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_drop_oldest_settled_messages_beyond_bound() {
        let q = MessageQueue::new(Arc::new(InMemoryStore::default()), 3);
        let now = time::now();
        let settled: Vec<_> = [3, 2, 1]
            .into_iter()
            .map(|hours| {
                let mut m = message(Channel::Email);
                m.status = MessageStatus::Delivered;
                m.created_at = now - TimeDelta::hours(hours);
                m
            })
            .collect();
        let (oldest, older, newest) = (settled[0].id, settled[1].id, settled[2].id);
        q.enqueue(settled).await.unwrap();

        let pending = vec![message(Channel::Email), message(Channel::Sms)];
        q.enqueue(pending.clone()).await.unwrap();

        assert_eq!(q.list(usize::MAX).await.len(), 3);
        assert!(q.get(oldest).await.is_none());
        assert!(q.get(older).await.is_none());
        assert!(q.get(newest).await.is_some());
        for m in &pending {
            assert!(q.get(m.id).await.is_some());
        }
    }

    #[tokio::test]
    async fn should_never_drop_pending_messages() {
        let q = MessageQueue::new(Arc::new(InMemoryStore::default()), 1);
        q.enqueue(vec![message(Channel::Email), message(Channel::Sms)])
            .await
            .unwrap();
        assert_eq!(q.stats().await.pending, 2);
    }
}
