//! Event intake.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::event::{DomainEvent, EntitySnapshot};
use upkeep_domain::execution::Execution;
use upkeep_domain::notification::NotificationMessage;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for `POST /api/events`.
#[derive(Deserialize)]
pub struct EmitRequest {
    pub name: String,
    pub entity: EntitySnapshot,
    /// Route the event inline and answer with what it started instead of
    /// handing it to the event loop.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
pub struct Processed {
    pub executions: Vec<Execution>,
    pub notifications: Vec<NotificationMessage>,
}

pub enum EmitResponse {
    Accepted,
    Processed(Json<Processed>),
}

impl IntoResponse for EmitResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted => StatusCode::ACCEPTED.into_response(),
            Self::Processed(json) => json.into_response(),
        }
    }
}

/// `POST /api/events`
pub async fn emit<S, E>(
    State(state): State<AppState<S, E>>,
    Json(req): Json<EmitRequest>,
) -> Result<EmitResponse, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    tracing::debug!(event = %req.name, entity_id = %req.entity.id, wait = req.wait, "event received");
    if !req.wait {
        state.engine.emit(req.name, req.entity).await?;
        return Ok(EmitResponse::Accepted);
    }
    let (executions, notifications) = state
        .engine
        .process_event(DomainEvent::new(req.name, req.entity))
        .await;
    Ok(EmitResponse::Processed(Json(Processed {
        executions,
        notifications,
    })))
}
