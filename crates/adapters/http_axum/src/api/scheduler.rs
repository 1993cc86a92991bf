//! Scheduler timer table.

use axum::Json;
use axum::extract::State;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_app::scheduler::TimerInfo;

use crate::state::AppState;

/// `GET /api/scheduler/timers` — one row per armed rule, oldest first.
pub async fn timers<S, E>(State(state): State<AppState<S, E>>) -> Json<Vec<TimerInfo>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.scheduled_timers())
}
