//! Execution log read model.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::error::{NotFoundError, UpkeepError};
use upkeep_domain::execution::{Execution, ExecutionStats};
use upkeep_domain::id::ExecutionId;

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub rule_id: Option<String>,
}

/// `GET /api/executions?rule_id=` — newest first.
pub async fn list<S, E>(
    State(state): State<AppState<S, E>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Execution>>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule_id = query.rule_id.as_deref().map(parse_id).transpose()?;
    Ok(Json(state.engine.get_executions(rule_id).await))
}

/// `GET /api/executions/stats`
pub async fn stats<S, E>(State(state): State<AppState<S, E>>) -> Json<ExecutionStats>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.get_execution_stats().await)
}

/// `GET /api/executions/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let id: ExecutionId = parse_id(&id)?;
    let execution = state.engine.get_execution(id).await.ok_or_else(|| {
        ApiError::from(UpkeepError::from(NotFoundError {
            entity: "Execution",
            id: id.to_string(),
        }))
    })?;
    Ok(Json(execution))
}
