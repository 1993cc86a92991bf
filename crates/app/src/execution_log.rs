//! Execution log — the record of every rule firing.
//!
//! Executions are append-mostly: the engine appends one when a rule fires
//! and then only replaces it with newer states of itself. The log keeps at
//! most `max_retained` executions, dropping the oldest finished ones first.

use std::sync::Arc;

use upkeep_domain::error::UpkeepError;
use upkeep_domain::execution::{Execution, ExecutionStats};
use upkeep_domain::id::{ExecutionId, RuleId};
use upkeep_domain::time;

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub const COLLECTION_KEY: &str = "executions";
pub const DEFAULT_MAX_RETAINED: usize = 1000;

pub struct ExecutionLog<S> {
    executions: Collection<S, Execution>,
    max_retained: usize,
}

impl<S: KeyValueStore + Send + Sync> ExecutionLog<S> {
    pub fn new(store: Arc<S>, max_retained: usize) -> Self {
        Self {
            executions: Collection::new(store, COLLECTION_KEY),
            max_retained: max_retained.max(1),
        }
    }

    /// Load the log. Executions left running by a previous process can
    /// never finish and are cancelled.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read or written.
    pub async fn load(&self) -> Result<usize, UpkeepError> {
        let count = self.executions.load().await?;
        let interrupted = self
            .executions
            .filter(|e| !e.status.is_terminal())
            .await
            .len();
        if interrupted > 0 {
            let now = time::now();
            self.executions
                .mutate(|executions| {
                    for execution in executions.iter_mut().filter(|e| !e.status.is_terminal()) {
                        execution.cancel(now);
                        execution.error = Some("interrupted by restart".to_string());
                    }
                    Ok(())
                })
                .await?;
            tracing::warn!(interrupted, "cancelled executions interrupted by restart");
        }
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns a storage error if the log cannot be saved.
    pub async fn append(&self, execution: Execution) -> Result<(), UpkeepError> {
        let max = self.max_retained;
        self.executions
            .mutate(|executions| {
                executions.push(execution);
                prune(executions, max);
                Ok(())
            })
            .await
    }

    /// Replace the stored state of an execution.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be saved.
    pub async fn update(&self, execution: Execution) -> Result<(), UpkeepError> {
        let max = self.max_retained;
        self.executions
            .mutate(|executions| {
                match executions.iter_mut().find(|e| e.id == execution.id) {
                    Some(slot) => *slot = execution,
                    None => {
                        executions.push(execution);
                        prune(executions, max);
                    }
                }
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: ExecutionId) -> Option<Execution> {
        self.executions.find(|e| e.id == id).await
    }

    /// Executions, newest first, optionally for one rule only.
    pub async fn list(&self, rule_id: Option<RuleId>) -> Vec<Execution> {
        let mut executions = self
            .executions
            .filter(|e| rule_id.is_none_or(|id| e.rule_id == id))
            .await;
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions
    }

    pub async fn stats(&self) -> ExecutionStats {
        ExecutionStats::from_executions(self.executions.all().await.iter())
    }
}

fn prune(executions: &mut Vec<Execution>, max: usize) {
    while executions.len() > max {
        let oldest_finished = executions
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status.is_terminal())
            .min_by_key(|(_, e)| e.started_at)
            .map(|(i, _)| i);
        match oldest_finished {
            Some(index) => {
                executions.remove(index);
            }
            None => break,
        }
    }
}
