//! JSON REST handlers for automation rules.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::automation::{ActionConfig, AutomationRule, Trigger};
use upkeep_domain::error::ValidationError;
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::execution::Execution;
use upkeep_domain::id::RuleId;

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

/// Request body for creating or replacing an automation rule.
#[derive(Deserialize)]
pub struct RuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub trigger: Option<Trigger>,
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl RuleRequest {
    fn into_rule(self, id: Option<RuleId>) -> Result<AutomationRule, ApiError> {
        let mut builder = AutomationRule::builder().name(self.name);
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
        if let Some(user) = self.created_by {
            builder = builder.created_by(user);
        }
        for action in self.actions {
            builder = builder.action(action);
        }
        Ok(builder.build()?)
    }
}

#[derive(Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Optional body of a manual run.
#[derive(Deserialize, Default)]
pub struct RunRequest {
    pub entity: Option<EntitySnapshot>,
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Created(Json<AutomationRule>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// Possible responses from the delete endpoint.
pub enum DeleteResponse {
    NoContent,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/automation-rules`
pub async fn list<S, E>(State(state): State<AppState<S, E>>) -> Json<Vec<AutomationRule>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.list_rules().await)
}

/// `GET /api/automation-rules/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationRule>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = state.engine.get_rule(parse_id(&id)?).await?;
    Ok(Json(rule))
}

/// `POST /api/automation-rules` — create a rule and arm its timer if it
/// is scheduled.
pub async fn create<S, E>(
    State(state): State<AppState<S, E>>,
    Json(req): Json<RuleRequest>,
) -> Result<CreateResponse, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let created = state.engine.create_rule(req.into_rule(None)?).await?;
    Ok(CreateResponse::Created(Json(created)))
}

/// `PUT /api/automation-rules/{id}` — replace a rule's definition.
pub async fn update<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    Json(req): Json<RuleRequest>,
) -> Result<Json<AutomationRule>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = req.into_rule(Some(parse_id(&id)?))?;
    Ok(Json(state.engine.update_rule(rule).await?))
}

/// `PUT /api/automation-rules/{id}/enabled`
pub async fn set_enabled<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    Json(req): Json<EnabledRequest>,
) -> Result<Json<AutomationRule>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let rule = state.engine.set_enabled(parse_id(&id)?, req.enabled).await?;
    Ok(Json(rule))
}

/// `DELETE /api/automation-rules/{id}`
pub async fn delete<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<DeleteResponse, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    state.engine.delete_rule(parse_id(&id)?).await?;
    Ok(DeleteResponse::NoContent)
}

/// `POST /api/automation-rules/{id}/run` — run a rule now and wait for its
/// executions. The body may name one entity to run against.
pub async fn run<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Vec<Execution>>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let id = parse_id(&id)?;
    let req: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ValidationError::InvalidPayload(err.to_string()))?
    };
    let executions = state.engine.run_rule(id, req.entity).await?;
    Ok(Json(executions))
}

#[cfg(test)]
mod tests {
    use crate::router::build;
    use crate::testing::{body_json, empty, get, send_json, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn manual_rule() -> Value {
        json!({
            "name": "Close work order",
            "trigger": {"type": "manual"},
            "actions": [{"type": "change_status", "parameters": {"status": "closed"}}]
        })
    }

    #[tokio::test]
    async fn should_create_and_fetch_rule() {
        let state = test_state();
        let response = build(state.clone())
            .oneshot(send_json(Method::POST, "/api/automation-rules", &manual_rule()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["name"], "Close work order");
        assert_eq!(created["enabled"], true);

        let uri = format!("/api/automation-rules/{}", created["id"].as_str().unwrap());
        let response = build(state).oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], created["id"]);
    }

    #[tokio::test]
    async fn should_reject_rule_without_actions() {
        let body = json!({"name": "empty", "actions": []});
        let response = build(test_state())
            .oneshot(send_json(Method::POST, "/api/automation-rules", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "a rule needs at least one action");
    }

    #[tokio::test]
    async fn should_return_400_for_malformed_id() {
        let response = build(test_state())
            .oneshot(get("/api/automation-rules/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_return_404_for_unknown_rule() {
        let uri = format!("/api/automation-rules/{}", upkeep_domain::id::RuleId::new());
        let response = build(test_state()).oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_arm_timer_for_scheduled_rule_and_cancel_on_delete() {
        let state = test_state();
        let body = json!({
            "name": "Daily inspection",
            "trigger": {"type": "time_based", "schedule": {"frequency": "daily"}},
            "actions": [{"type": "change_status"}]
        });
        let created = body_json(
            build(state.clone())
                .oneshot(send_json(Method::POST, "/api/automation-rules", &body))
                .await
                .unwrap(),
        )
        .await;

        let timers = body_json(build(state.clone()).oneshot(get("/api/scheduler/timers")).await.unwrap()).await;
        assert_eq!(timers[0]["rule_id"], created["id"]);
        assert_eq!(timers[0]["state"], "armed");

        let uri = format!("/api/automation-rules/{}", created["id"].as_str().unwrap());
        let response = build(state.clone()).oneshot(empty(Method::DELETE, &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let timers = body_json(build(state).oneshot(get("/api/scheduler/timers")).await.unwrap()).await;
        assert_eq!(timers, json!([]));
    }

    #[tokio::test]
    async fn should_run_rule_against_given_entity() {
        let state = test_state();
        let created = body_json(
            build(state.clone())
                .oneshot(send_json(Method::POST, "/api/automation-rules", &manual_rule()))
                .await
                .unwrap(),
        )
        .await;

        let uri = format!("/api/automation-rules/{}/run", created["id"].as_str().unwrap());
        let body = json!({"entity": {"id": "wo-7", "entity_type": "work_order", "data": {"status": "open"}}});
        let response = build(state).oneshot(send_json(Method::POST, &uri, &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let executions = body_json(response).await;
        assert_eq!(executions[0]["status"], "completed");
        assert_eq!(executions[0]["entity_id"], "wo-7");
    }

    #[tokio::test]
    async fn should_refuse_to_run_disabled_rule() {
        let state = test_state();
        let created = body_json(
            build(state.clone())
                .oneshot(send_json(Method::POST, "/api/automation-rules", &manual_rule()))
                .await
                .unwrap(),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let response = build(state.clone())
            .oneshot(send_json(
                Method::PUT,
                &format!("/api/automation-rules/{id}/enabled"),
                &json!({"enabled": false}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["enabled"], false);

        let response = build(state)
            .oneshot(empty(Method::POST, &format!("/api/automation-rules/{id}/run")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
