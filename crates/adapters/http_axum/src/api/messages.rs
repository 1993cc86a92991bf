//! Notification messages: direct sends and the queue's read model.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use upkeep_app::dispatcher::SendRequest;
use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::error::{NotFoundError, UpkeepError};
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::id::{MessageId, TemplateId};
use upkeep_domain::notification::{Channel, NotificationMessage, NotificationStats, Priority};
use upkeep_domain::time::Timestamp;

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Request body for `POST /api/messages`.
#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub priority: Priority,
    /// Entity whose fields the subject and body are rendered against.
    pub entity: Option<EntitySnapshot>,
    pub scheduled_for: Option<Timestamp>,
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub respect_quiet_hours: bool,
}

impl From<SendMessageRequest> for SendRequest {
    fn from(req: SendMessageRequest) -> Self {
        let request = SendRequest {
            channels: req.channels,
            recipients: req.recipients,
            subject: req.subject,
            body: req.body,
            template_id: req.template_id,
            priority: req.priority,
            scheduled_for: req.scheduled_for,
            batch_size: req.batch_size,
            respect_quiet_hours: req.respect_quiet_hours,
            ..SendRequest::default()
        };
        match &req.entity {
            Some(entity) => request.about(entity),
            None => request,
        }
    }
}

/// `GET /api/messages?limit=` — newest first.
pub async fn list<S, E>(
    State(state): State<AppState<S, E>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<NotificationMessage>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(state.engine.get_messages(limit).await)
}

/// `POST /api/messages` — build, queue and attempt delivery.
pub async fn send<S, E>(
    State(state): State<AppState<S, E>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Vec<NotificationMessage>>), ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let messages = state.engine.send(req.into()).await?;
    Ok((StatusCode::CREATED, Json(messages)))
}

/// `GET /api/messages/stats`
pub async fn stats<S, E>(State(state): State<AppState<S, E>>) -> Json<NotificationStats>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.get_stats().await)
}

/// `GET /api/messages/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationMessage>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let id: MessageId = parse_id(&id)?;
    let message = state.engine.get_message(id).await.ok_or_else(|| {
        ApiError::from(UpkeepError::from(NotFoundError {
            entity: "NotificationMessage",
            id: id.to_string(),
        }))
    })?;
    Ok(Json(message))
}

/// `POST /api/messages/{id}/read`
pub async fn mark_read<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationMessage>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Ok(Json(state.engine.mark_read(parse_id(&id)?).await?))
}
