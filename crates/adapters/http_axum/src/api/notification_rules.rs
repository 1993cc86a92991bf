//! JSON REST handlers for notification rules.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::automation::Trigger;
use upkeep_domain::id::{NotificationRuleId, TemplateId};
use upkeep_domain::notification::{
    Channel, NotificationRule, NotificationScheduling, Priority, RecipientSpec,
};

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

/// Request body for creating or replacing a notification rule.
#[derive(Deserialize)]
pub struct NotificationRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub recipients: RecipientSpec,
    pub template_id: Option<TemplateId>,
    pub subject: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduling: Option<NotificationScheduling>,
}

impl NotificationRuleRequest {
    fn into_rule(self, id: Option<NotificationRuleId>) -> Result<NotificationRule, ApiError> {
        let mut builder = NotificationRule::builder()
            .name(self.name)
            .recipients(self.recipients)
            .priority(self.priority);
        if let Some(id) = id {
            builder = builder.id(id);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(enabled) = self.enabled {
            builder = builder.enabled(enabled);
        }
        if let Some(trigger) = self.trigger {
            builder = builder.trigger(trigger);
        }
        for channel in self.channels {
            builder = builder.channel(channel);
        }
        if let Some(template_id) = self.template_id {
            builder = builder.template(template_id);
        }
        if let Some(subject) = self.subject {
            builder = builder.subject(subject);
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        if let Some(scheduling) = self.scheduling {
            builder = builder.scheduling(scheduling);
        }
        Ok(builder.build()?)
    }
}

/// `GET /api/notification-rules`
pub async fn list<S, E>(State(state): State<AppState<S, E>>) -> Json<Vec<NotificationRule>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.notification_rules().list_rules().await)
}

/// `GET /api/notification-rules/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRule>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = state.engine.notification_rules().get_rule(parse_id(&id)?).await?;
    Ok(Json(rule))
}

/// `POST /api/notification-rules`
pub async fn create<S, E>(
    State(state): State<AppState<S, E>>,
    Json(req): Json<NotificationRuleRequest>,
) -> Result<(StatusCode, Json<NotificationRule>), ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = req.into_rule(None)?;
    let created = state.engine.notification_rules().create_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /api/notification-rules/{id}`
pub async fn update<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    Json(req): Json<NotificationRuleRequest>,
) -> Result<Json<NotificationRule>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = req.into_rule(Some(parse_id(&id)?))?;
    Ok(Json(state.engine.notification_rules().update_rule(rule).await?))
}

/// `DELETE /api/notification-rules/{id}`
pub async fn delete<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    state.engine.notification_rules().delete_rule(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
