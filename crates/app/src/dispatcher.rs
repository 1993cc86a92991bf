//! Notification dispatcher — turns send requests and matching notification
//! rules into queued messages, and delivers queued messages through the
//! configured channel providers.
//!
//! ```text
//!  send / trigger_notifications ──▶ MessageQueue ──▶ drain_due ──▶ provider
//!                                        ▲                            │
//!                                        └───── retry (backoff) ◀─────┘
//! ```
//!
//! Delivery on one channel never waits for another: `drain_due` runs one
//! task per channel, and within a channel messages go out one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::id::{MessageId, TemplateId};
use upkeep_domain::notification::{
    Channel, FailureOutcome, MessageMetadata, MessageOrigin, NotificationMessage,
    NotificationStats, Priority, RecipientSpec, RetryPolicy,
};
use upkeep_domain::template;
use upkeep_domain::time::{self, Timestamp};

use crate::message_queue::{self, MessageQueue};
use crate::ports::{
    Delivery, DeliveryTarget, KeyValueStore, MemberDirectory, NotificationProvider,
};
use crate::services::{NotificationRuleService, RecipientService, TemplateService};

/// Delivery tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Upper bound on one provider call.
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
    /// Messages delivered per channel on one drain tick.
    pub max_per_channel_per_tick: usize,
    /// Settled messages beyond this many are dropped, oldest first.
    pub max_retained_messages: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            max_per_channel_per_tick: 50,
            max_retained_messages: message_queue::DEFAULT_MAX_RETAINED,
        }
    }
}

/// A request to notify recipients on one or more channels.
///
/// Subject and body are rendered against `metadata.variables`; a template,
/// when given, takes their place.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub channels: Vec<Channel>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub template_id: Option<TemplateId>,
    pub priority: Priority,
    pub metadata: MessageMetadata,
    pub origin: Option<MessageOrigin>,
    pub scheduled_for: Option<Timestamp>,
    /// Split recipients into messages of at most this many.
    pub batch_size: Option<usize>,
    /// Hold non-urgent messages until each recipient's quiet hours end.
    pub respect_quiet_hours: bool,
}

impl SendRequest {
    #[must_use]
    pub fn new<I, R>(channels: impl IntoIterator<Item = Channel>, recipients: I, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            channels: channels.into_iter().collect(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn about(mut self, entity: &EntitySnapshot) -> Self {
        self.metadata.entity_id = Some(entity.id.clone());
        self.metadata.entity_type = Some(entity.entity_type.clone());
        self.metadata.variables = entity.variables();
        self
    }
}

/// Rendered content shared by every message of one request.
struct Content {
    subject: Option<String>,
    body: String,
}

/// Recipients that go out together, and when.
struct Batch {
    scheduled_for: Option<Timestamp>,
    recipients: Vec<String>,
}

pub struct Dispatcher<S> {
    queue: MessageQueue<S>,
    templates: Arc<TemplateService<S>>,
    recipients: Arc<RecipientService<S>>,
    rules: Arc<NotificationRuleService<S>>,
    directory: Arc<dyn MemberDirectory>,
    providers: RwLock<HashMap<Channel, Arc<dyn NotificationProvider>>>,
    settings: DispatcherSettings,
}

impl<S: KeyValueStore + Send + Sync + 'static> Dispatcher<S> {
    pub fn new(store: Arc<S>, directory: Arc<dyn MemberDirectory>, settings: DispatcherSettings) -> Self {
        Self {
            queue: MessageQueue::new(store.clone(), settings.max_retained_messages),
            templates: Arc::new(TemplateService::new(store.clone())),
            recipients: Arc::new(RecipientService::new(store.clone())),
            rules: Arc::new(NotificationRuleService::new(store)),
            directory,
            providers: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Load templates, recipients, notification rules and queued messages.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any collection cannot be read.
    pub async fn load(&self) -> Result<(), UpkeepError> {
        self.templates.load().await?;
        self.recipients.load().await?;
        self.rules.load().await?;
        let queued = self.queue.load().await?;
        tracing::info!(queued, "dispatcher loaded");
        Ok(())
    }

    pub fn templates(&self) -> &Arc<TemplateService<S>> {
        &self.templates
    }

    pub fn recipients(&self) -> &Arc<RecipientService<S>> {
        &self.recipients
    }

    pub fn notification_rules(&self) -> &Arc<NotificationRuleService<S>> {
        &self.rules
    }

    /// Install (or replace) the provider for `channel`.
    pub async fn set_provider(&self, channel: Channel, provider: Arc<dyn NotificationProvider>) {
        self.providers.write().await.insert(channel, provider);
        tracing::info!(%channel, "notification provider installed");
    }

    pub async fn has_provider(&self, channel: Channel) -> bool {
        self.providers.read().await.contains_key(&channel)
    }

    /// Queue messages for `request` and deliver the ones that are due now.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown template, or a
    /// storage error if the queue cannot be saved.
    pub async fn send(&self, request: SendRequest) -> Result<Vec<NotificationMessage>, UpkeepError> {
        self.send_at(request, time::now()).await
    }

    /// [`send`](Self::send) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    #[tracing::instrument(skip(self, request), fields(channels = request.channels.len(), recipients = request.recipients.len()))]
    pub async fn send_at(
        &self,
        request: SendRequest,
        now: Timestamp,
    ) -> Result<Vec<NotificationMessage>, UpkeepError> {
        let content = self.render(&request).await?;

        let mut messages = Vec::new();
        let mut planned = HashMap::new();
        for &channel in &request.channels {
            for batch in self.plan(channel, &request, now, &mut planned).await {
                let mut message = NotificationMessage::new(channel, batch.recipients, content.body.clone(), now);
                message.subject.clone_from(&content.subject);
                message.priority = request.priority;
                message.template_id = request.template_id;
                message.origin = request.origin;
                message.metadata = request.metadata.clone();
                message.scheduled_for = batch.scheduled_for;
                message.max_retries = self.settings.retry.max_retries;
                messages.push(message);
            }
        }

        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        self.queue.enqueue(messages).await?;
        tracing::debug!(queued = ids.len(), "messages queued");

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(processed) = self.process_message(id, now).await? {
                result.push(processed);
            } else if let Some(queued) = self.queue.get(id).await {
                result.push(queued);
            }
        }
        Ok(result)
    }

    async fn render(&self, request: &SendRequest) -> Result<Content, UpkeepError> {
        let variables = &request.metadata.variables;
        if let Some(template_id) = request.template_id {
            let template = self.templates.get_template(template_id).await?;
            let (subject, body) = template.render(variables);
            return Ok(Content { subject, body });
        }
        Ok(Content {
            subject: request.subject.as_deref().map(|s| template::render(s, variables)),
            body: template::render(request.body.as_deref().unwrap_or_default(), variables),
        })
    }

    /// Apply recipient preferences for one channel and group the survivors
    /// into batches by delivery time.
    ///
    /// `planned` counts the messages each recipient already gets from the
    /// current request, so rate limits hold across its channels.
    async fn plan(
        &self,
        channel: Channel,
        request: &SendRequest,
        now: Timestamp,
        planned: &mut HashMap<String, usize>,
    ) -> Vec<Batch> {
        if request.recipients.is_empty() {
            return vec![Batch {
                scheduled_for: request.scheduled_for,
                recipients: Vec::new(),
            }];
        }

        let mut groups: Vec<Batch> = Vec::new();
        for id in &request.recipients {
            let mut scheduled_for = request.scheduled_for;
            if let Some(recipient) = self.recipients.find(id).await {
                if !recipient.accepts(channel) {
                    tracing::debug!(recipient = %id, %channel, "channel not in recipient preferences");
                    continue;
                }
                let already = planned.get(id).copied().unwrap_or(0);
                let prefs = &recipient.preferences;
                if self.over_limit(id, prefs.max_per_hour, TimeDelta::hours(1), now, already).await
                    || self.over_limit(id, prefs.max_per_day, TimeDelta::days(1), now, already).await
                {
                    tracing::info!(recipient = %id, %channel, "recipient rate limit reached");
                    continue;
                }
                let quiet_end = recipient
                    .preferences
                    .quiet_hours
                    .as_ref()
                    .and_then(|quiet| quiet.window_end(scheduled_for.unwrap_or(now)));
                if let Some(end) = quiet_end.filter(|_| request.respect_quiet_hours && request.priority != Priority::Urgent) {
                    tracing::debug!(recipient = %id, until = %end, "deferred by quiet hours");
                    scheduled_for = Some(end);
                }
            }
            *planned.entry(id.clone()).or_default() += 1;
            match groups.iter_mut().find(|g| g.scheduled_for == scheduled_for) {
                Some(group) => group.recipients.push(id.clone()),
                None => groups.push(Batch {
                    scheduled_for,
                    recipients: vec![id.clone()],
                }),
            }
        }

        match request.batch_size.filter(|size| *size > 0) {
            None => groups,
            Some(size) => groups
                .into_iter()
                .flat_map(|group| {
                    group
                        .recipients
                        .chunks(size)
                        .map(|chunk| Batch {
                            scheduled_for: group.scheduled_for,
                            recipients: chunk.to_vec(),
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    async fn over_limit(
        &self,
        recipient: &str,
        limit: Option<u32>,
        period: TimeDelta,
        now: Timestamp,
        planned: usize,
    ) -> bool {
        let Some(limit) = limit else {
            return false;
        };
        let sent = self.queue.recent_count(recipient, now - period).await;
        sent + planned >= usize::try_from(limit).unwrap_or(usize::MAX)
    }

    /// Attempt delivery of one message.
    ///
    /// Returns `None` when the message is unknown, not pending, not yet due,
    /// or being delivered by another worker.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the new message state cannot be saved.
    #[tracing::instrument(skip(self))]
    pub async fn process_message(
        &self,
        id: MessageId,
        now: Timestamp,
    ) -> Result<Option<NotificationMessage>, UpkeepError> {
        let Some(mut message) = self.queue.claim(id, now).await else {
            return Ok(None);
        };

        match self.deliver(&message).await {
            Ok(provider_message_id) => {
                message.mark_sent(provider_message_id, now);
                tracing::info!(message_id = %id, channel = %message.channel, status = ?message.status, "notification sent");
            }
            Err(error) => match message.record_failure(error, now, &self.settings.retry) {
                FailureOutcome::Retry(due) => tracing::warn!(
                    message_id = %id,
                    channel = %message.channel,
                    retry_count = message.retry_count,
                    retry_at = %due,
                    error = message.error.as_deref().unwrap_or_default(),
                    "delivery failed, will retry"
                ),
                FailureOutcome::Exhausted => tracing::error!(
                    message_id = %id,
                    channel = %message.channel,
                    error = message.error.as_deref().unwrap_or_default(),
                    "delivery failed permanently"
                ),
            },
        }

        self.queue.release(message.clone()).await?;
        Ok(Some(message))
    }

    async fn deliver(&self, message: &NotificationMessage) -> Result<Option<String>, String> {
        let channel = message.channel;
        let provider = self.providers.read().await.get(&channel).cloned();
        let Some(provider) = provider else {
            return Err(format!("{channel} provider not configured"));
        };

        let delivery = self.delivery(message).await;
        match tokio::time::timeout(self.settings.send_timeout, provider.send(&delivery)).await {
            Ok(response) if response.success => Ok(response.message_id),
            Ok(response) => Err(response
                .error
                .unwrap_or_else(|| format!("{channel} provider rejected the message"))),
            Err(_) => Err(format!(
                "{channel} provider timed out after {}s",
                self.settings.send_timeout.as_secs()
            )),
        }
    }

    async fn delivery(&self, message: &NotificationMessage) -> Delivery {
        let mut targets = Vec::with_capacity(message.recipients.len());
        for id in &message.recipients {
            let address = self
                .recipients
                .find(id)
                .await
                .and_then(|r| r.address(message.channel));
            targets.push(DeliveryTarget { id: id.clone(), address });
        }
        let is_html = match message.template_id {
            Some(template_id) => self
                .templates
                .get_template(template_id)
                .await
                .is_ok_and(|t| t.is_html),
            None => false,
        };
        Delivery {
            message_id: message.id,
            channel: message.channel,
            targets,
            subject: message.subject.clone(),
            body: message.body.clone(),
            priority: message.priority,
            is_html,
        }
    }

    /// Deliver every message that is due at `now`.
    ///
    /// Channels are drained in parallel; each channel delivers at most
    /// `max_per_channel_per_tick` messages in order. Pending retries whose
    /// window has passed are failed first. Returns the number of messages
    /// attempted.
    pub async fn drain_due(self: &Arc<Self>, now: Timestamp) -> usize {
        if let Err(err) = self.queue.expire_overdue(now).await {
            tracing::error!(error = %err, "failed to expire overdue messages");
        }

        let due = self
            .queue
            .due_by_channel(now, self.settings.max_per_channel_per_tick)
            .await;
        let mut workers = JoinSet::new();
        for (channel, ids) in due {
            let this = Arc::clone(self);
            workers.spawn(async move {
                let mut attempted = 0;
                for id in ids {
                    match this.process_message(id, now).await {
                        Ok(Some(_)) => attempted += 1,
                        Ok(None) => {}
                        Err(err) => {
                            tracing::error!(%channel, message_id = %id, error = %err, "failed to record delivery");
                        }
                    }
                }
                attempted
            });
        }

        let mut attempted = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(count) => attempted += count,
                Err(err) => tracing::error!(error = %err, "channel worker panicked"),
            }
        }
        if attempted > 0 {
            tracing::debug!(attempted, "drain tick finished");
        }
        attempted
    }

    /// Notify for every enabled notification rule that applies to `event`
    /// about `entity`.
    ///
    /// Errors for one rule are logged and do not stop the others.
    #[tracing::instrument(skip(self, entity), fields(entity_id = %entity.id))]
    pub async fn trigger_notifications(&self, event: &str, entity: &EntitySnapshot) -> Vec<NotificationMessage> {
        let now = time::now();
        let variables = entity.variables();
        let rules = self.rules.matching(event, &variables).await;

        let mut messages = Vec::new();
        for rule in rules {
            let scheduling = rule.scheduling.clone().unwrap_or_default();
            let request = SendRequest {
                channels: rule.channels.iter().copied().collect(),
                recipients: self.resolve_recipients(&rule.recipients).await,
                subject: rule.subject.clone(),
                body: rule.body.clone(),
                template_id: rule.template_id,
                priority: rule.priority,
                metadata: MessageMetadata {
                    triggered_by: Some(event.to_string()),
                    ..MessageMetadata::default()
                },
                origin: Some(MessageOrigin::Notification(rule.id)),
                scheduled_for: (scheduling.delay_minutes > 0)
                    .then(|| now + TimeDelta::minutes(i64::from(scheduling.delay_minutes))),
                batch_size: if scheduling.batch { scheduling.batch_size } else { None },
                respect_quiet_hours: scheduling.respect_quiet_hours,
            }
            .about(entity);

            match self.send_at(request, now).await {
                Ok(sent) => {
                    tracing::info!(rule_id = %rule.id, messages = sent.len(), "notification rule matched");
                    messages.extend(sent);
                }
                Err(err) => tracing::warn!(rule_id = %rule.id, error = %err, "notification rule failed"),
            }
        }
        messages
    }

    /// Users, then group members, then role members, without duplicates.
    async fn resolve_recipients(&self, spec: &RecipientSpec) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::new();
        let mut add = |ids: Vec<String>| {
            for id in ids {
                if !resolved.contains(&id) {
                    resolved.push(id);
                }
            }
        };
        add(spec.users.clone());
        for group in &spec.groups {
            match self.directory.group_members(group).await {
                Ok(members) => add(members),
                Err(err) => tracing::warn!(%group, error = %err, "group lookup failed"),
            }
        }
        for role in &spec.roles {
            match self.directory.role_members(role).await {
                Ok(members) => add(members),
                Err(err) => tracing::warn!(%role, error = %err, "role lookup failed"),
            }
        }
        resolved
    }

    /// Mark a sent or delivered message as read. Other messages are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`UpkeepError::NotFound`] for an unknown id.
    pub async fn mark_read(&self, id: MessageId) -> Result<NotificationMessage, UpkeepError> {
        let now = time::now();
        self.queue
            .update_with(id, |message| {
                message.mark_read(now);
            })
            .await
    }

    pub async fn get_message(&self, id: MessageId) -> Option<NotificationMessage> {
        self.queue.get(id).await
    }

    pub async fn get_messages(&self, limit: usize) -> Vec<NotificationMessage> {
        self.queue.list(limit).await
    }

    pub async fn get_stats(&self) -> NotificationStats {
        self.queue.stats().await
    }
}
