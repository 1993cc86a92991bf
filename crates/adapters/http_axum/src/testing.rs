//! In-memory ports and request helpers for handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use serde_json::Value;

use upkeep_app::engine::{Engine, EngineSettings};
use upkeep_app::ports::{
    CommandError, CommandSink, EmptyDirectory, EntityCommand, EntitySource, KeyValueStore,
};
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;

use crate::state::AppState;

#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, UpkeepError> {
        Ok(self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, value: String) -> Result<(), UpkeepError> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Default)]
pub struct FixedEntities(Vec<EntitySnapshot>);

impl EntitySource for FixedEntities {
    async fn list_entities(&self) -> Result<Vec<EntitySnapshot>, UpkeepError> {
        Ok(self.0.clone())
    }
}

pub struct AcceptingSink;

#[async_trait]
impl CommandSink for AcceptingSink {
    async fn execute(&self, command: EntityCommand) -> Result<Option<Value>, CommandError> {
        Ok(Some(serde_json::json!({"applied": command.action})))
    }
}

pub type TestState = AppState<MemoryStore, FixedEntities>;

pub fn test_state() -> TestState {
    let engine = Engine::new(
        Arc::new(MemoryStore::default()),
        Arc::new(FixedEntities::default()),
        Arc::new(EmptyDirectory),
        Arc::new(AcceptingSink),
        EngineSettings::default(),
    );
    AppState::new(Arc::new(engine))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn send_json(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
