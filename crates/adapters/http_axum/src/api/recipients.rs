//! JSON REST handlers for the recipient catalog.
//!
//! Recipient ids are the host application's user, group or role ids, so
//! they are taken as plain strings.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use upkeep_app::ports::{EntitySource, KeyValueStore};
use upkeep_domain::notification::NotificationRecipient;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/recipients`
pub async fn list<S, E>(State(state): State<AppState<S, E>>) -> Json<Vec<NotificationRecipient>>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Json(state.engine.recipients().list_recipients().await)
}

/// `GET /api/recipients/{id}`
pub async fn get<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecipient>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    Ok(Json(state.engine.recipients().get_recipient(&id).await?))
}

/// `POST /api/recipients` — insert, or replace the recipient with the same id.
pub async fn save<S, E>(
    State(state): State<AppState<S, E>>,
    Json(recipient): Json<NotificationRecipient>,
) -> Result<(StatusCode, Json<NotificationRecipient>), ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    let saved = state.engine.recipients().save_recipient(recipient).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// `PUT /api/recipients/{id}`
pub async fn replace<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
    Json(mut recipient): Json<NotificationRecipient>,
) -> Result<Json<NotificationRecipient>, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    recipient.id = id;
    Ok(Json(state.engine.recipients().save_recipient(recipient).await?))
}

/// `DELETE /api/recipients/{id}`
pub async fn delete<S, E>(
    State(state): State<AppState<S, E>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: KeyValueStore + Send + Sync + 'static,
    E: EntitySource + Send + Sync + 'static,
{
    state.engine.recipients().delete_recipient(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::router::build;
    use crate::testing::{body_json, empty, get, send_json, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn should_upsert_recipient_by_path_id() {
        let state = test_state();
        let body = json!({
            "id": "ignored",
            "name": "Dana",
            "email": "dana@example.com",
            "preferences": {"channels": ["email"]}
        });
        let response = build(state.clone())
            .oneshot(send_json(Method::PUT, "/api/recipients/u-42", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], "u-42");

        let fetched = body_json(build(state.clone()).oneshot(get("/api/recipients/u-42")).await.unwrap()).await;
        assert_eq!(fetched["email"], "dana@example.com");

        let response = build(state.clone())
            .oneshot(empty(Method::DELETE, "/api/recipients/u-42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = build(state).oneshot(get("/api/recipients/u-42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_reject_recipient_without_name() {
        let body = json!({"id": "u-1", "name": " "});
        let response = build(test_state())
            .oneshot(send_json(Method::POST, "/api/recipients", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
