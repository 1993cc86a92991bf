//! JSON REST handlers for notification templates.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::notification::NotificationTemplate;

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

/// `GET /api/templates`
pub async fn list<S, E>(State(state): State<AppState<S, E>>) -> Json<Vec<NotificationTemplate>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.templates().list_templates().await)
}

/// `GET /api/templates/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationTemplate>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Ok(Json(state.engine.templates().get_template(parse_id(&id)?).await?))
}

/// `POST /api/templates` — a missing id is generated.
pub async fn create<S, E>(
    State(state): State<AppState<S, E>>,
    Json(template): Json<NotificationTemplate>,
) -> Result<(StatusCode, Json<NotificationTemplate>), ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let created = state.engine.templates().create_template(template).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /api/templates/{id}` — the path id wins over the body.
pub async fn update<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    Json(mut template): Json<NotificationTemplate>,
) -> Result<Json<NotificationTemplate>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    template.id = parse_id(&id)?;
    Ok(Json(state.engine.templates().update_template(template).await?))
}

/// `DELETE /api/templates/{id}`
pub async fn delete<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    state.engine.templates().delete_template(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::router::build;
    use crate::testing::{body_json, get, send_json, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn should_create_template_with_derived_variables() {
        let state = test_state();
        let body = json!({
            "name": "Overdue email",
            "channel": "email",
            "subject": "{{title}} overdue",
            "body": "Assigned to {{assignee.name}}"
        });
        let response = build(state.clone())
            .oneshot(send_json(Method::POST, "/api/templates", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["variables"], json!(["title", "assignee.name"]));

        let uri = format!("/api/templates/{}", created["id"].as_str().unwrap());
        let fetched = body_json(build(state).oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(fetched["name"], "Overdue email");
    }

    #[tokio::test]
    async fn should_return_404_when_updating_unknown_template() {
        let uri = format!("/api/templates/{}", upkeep_domain::id::TemplateId::new());
        let body = json!({"name": "x", "channel": "sms", "body": "hi"});
        let response = build(test_state())
            .oneshot(send_json(Method::PUT, &uri, &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
