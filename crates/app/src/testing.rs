//! In-memory port fakes shared by the unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use upkeep_domain::automation::ActionKind;
use upkeep_domain::error::UpkeepError;
use upkeep_domain::event::EntitySnapshot;
use upkeep_domain::time;

use crate::ports::{
    CommandError, CommandSink, Delivery, EntityCommand, EntitySource, KeyValueStore,
    MemberDirectory, NotificationProvider, ProviderResponse,
};
use crate::scheduler::Clock;

// ── Clock ──────────────────────────────────────────────────────────

/// Wall clock that starts at the real time and then follows tokio's clock,
/// so paused tests can move it forward.
pub fn paused_clock() -> Clock {
    let wall = time::now();
    let start = tokio::time::Instant::now();
    Arc::new(move || wall + chrono::TimeDelta::from_std(start.elapsed()).unwrap_or(chrono::TimeDelta::zero()))
}

// ── Store ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.docs.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for InMemoryStore {
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, UpkeepError>> + Send {
        let value = self.raw(key);
        async { Ok(value) }
    }

    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), UpkeepError>> + Send {
        self.docs.lock().unwrap().insert(key.to_string(), value);
        async { Ok(()) }
    }
}

// ── Entities ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticEntities {
    entities: Mutex<Vec<EntitySnapshot>>,
}

impl StaticEntities {
    pub fn with(entities: Vec<EntitySnapshot>) -> Self {
        Self {
            entities: Mutex::new(entities),
        }
    }

    pub fn replace(&self, snapshot: EntitySnapshot) {
        let mut entities = self.entities.lock().unwrap();
        entities.retain(|e| e.id != snapshot.id);
        entities.push(snapshot);
    }
}

impl EntitySource for StaticEntities {
    fn list_entities(&self) -> impl Future<Output = Result<Vec<EntitySnapshot>, UpkeepError>> + Send {
        let entities = self.entities.lock().unwrap().clone();
        async { Ok(entities) }
    }
}

// ── Directory ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticMembers {
    pub groups: HashMap<String, Vec<String>>,
    pub roles: HashMap<String, Vec<String>>,
}

#[async_trait]
impl MemberDirectory for StaticMembers {
    async fn group_members(&self, group: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }

    async fn role_members(&self, role: &str) -> Result<Vec<String>, UpkeepError> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}

// ── Provider ───────────────────────────────────────────────────────

#[derive(Clone)]
pub enum ProviderMode {
    Accept,
    Fail(String),
    Hang,
}

pub struct RecordingProvider {
    mode: Mutex<ProviderMode>,
    pub sent: Mutex<Vec<Delivery>>,
}

impl RecordingProvider {
    pub fn new(mode: ProviderMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: ProviderMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    async fn send(&self, delivery: &Delivery) -> ProviderResponse {
        self.sent.lock().unwrap().push(delivery.clone());
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            ProviderMode::Accept => ProviderResponse::accepted(format!("ext-{}", delivery.message_id)),
            ProviderMode::Fail(error) => ProviderResponse::failed(error),
            ProviderMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ProviderResponse::accepted("late")
            }
        }
    }
}

// ── Command sink ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub commands: Mutex<Vec<EntityCommand>>,
    pub fail_on: Option<ActionKind>,
}

impl RecordingSink {
    pub fn failing_on(kind: ActionKind) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_on: Some(kind),
        }
    }

    pub fn actions(&self) -> Vec<ActionKind> {
        self.commands.lock().unwrap().iter().map(|c| c.action).collect()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn execute(&self, command: EntityCommand) -> Result<Option<Value>, CommandError> {
        let action = command.action;
        self.commands.lock().unwrap().push(command);
        if self.fail_on == Some(action) {
            return Err(CommandError(format!("host rejected {action}")));
        }
        Ok(Some(serde_json::json!({"applied": action.as_str()})))
    }
}
