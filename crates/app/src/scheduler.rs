//! Trigger scheduler — one timer task per enabled time-based rule.
//!
//! ```text
//! register ──▶ Armed{next_fire} ──sleep──▶ Firing ──send FireRequest──▶ Rearming ─┐
//!                  ▲                                                              │
//!                  └──────────── next_execution(now) ◀────────────────────────────┘
//! cancel / re-register ──▶ Cancelled (task aborted)
//! ```
//!
//! Every registration gets a fresh generation number. Fire requests carry
//! the generation they were armed with, so the consumer can drop requests
//! from a timer that has since been replaced or cancelled.
//!
//! A timer never fires before its slot on the scheduler's [`Clock`]. When it
//! wakes early, because the wall clock was set back, it sleeps again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use upkeep_domain::automation::{AutomationRule, Schedule};
use upkeep_domain::id::RuleId;
use upkeep_domain::time::{self, Timestamp};

/// Wall-clock source for arming and firing timers.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Ask the router to run a scheduled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireRequest {
    pub rule_id: RuleId,
    pub generation: u64,
    pub scheduled_for: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimerState {
    Armed { next_fire: Timestamp },
    Firing,
    Rearming,
    Cancelled,
}

/// A row of the timer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerInfo {
    pub rule_id: RuleId,
    pub generation: u64,
    #[serde(flatten)]
    pub state: TimerState,
}

struct ArmedTimer {
    generation: u64,
    state: TimerState,
    task: JoinHandle<()>,
}

type TimerTable = Arc<Mutex<HashMap<RuleId, ArmedTimer>>>;

fn lock(table: &TimerTable) -> MutexGuard<'_, HashMap<RuleId, ArmedTimer>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Move the timer to `state` if it still belongs to `generation`.
fn transition(table: &TimerTable, rule_id: RuleId, generation: u64, state: TimerState) -> bool {
    match lock(table).get_mut(&rule_id) {
        Some(timer) if timer.generation == generation => {
            timer.state = state;
            true
        }
        _ => false,
    }
}

pub struct Scheduler {
    timers: TimerTable,
    generations: AtomicU64,
    fire_tx: mpsc::UnboundedSender<FireRequest>,
    clock: Clock,
}

impl Scheduler {
    /// Create a scheduler on the system clock and the receiving end of its
    /// fire requests.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FireRequest>) {
        Self::with_clock(Arc::new(time::now))
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> (Self, mpsc::UnboundedReceiver<FireRequest>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(1),
            fire_tx,
            clock,
        };
        (scheduler, fire_rx)
    }

    /// Arm (or re-arm) the timer for `rule`.
    ///
    /// Any existing timer for the rule is cancelled first. Rules that are
    /// disabled or not time-based end up with no timer. Returns the first
    /// fire time.
    pub fn register(&self, rule: &AutomationRule) -> Option<Timestamp> {
        let schedule = match rule.trigger.schedule() {
            Some(schedule) if rule.enabled => schedule.clone(),
            _ => {
                self.cancel(rule.id);
                return None;
            }
        };
        let Some(first) = schedule.next_execution((self.clock)()) else {
            tracing::warn!(rule_id = %rule.id, %schedule, "schedule has no next execution");
            self.cancel(rule.id);
            return None;
        };

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let mut timers = lock(&self.timers);
        if let Some(previous) = timers.remove(&rule.id) {
            previous.task.abort();
        }
        let task = tokio::spawn(run_timer(
            TimerTask {
                timers: Arc::clone(&self.timers),
                fire_tx: self.fire_tx.clone(),
                clock: Arc::clone(&self.clock),
                rule_id: rule.id,
                generation,
                schedule,
            },
            first,
        ));
        timers.insert(
            rule.id,
            ArmedTimer {
                generation,
                state: TimerState::Armed { next_fire: first },
                task,
            },
        );
        tracing::info!(rule_id = %rule.id, generation, next_fire = %first, "timer armed");
        Some(first)
    }

    /// Stop the timer for `rule_id`, returning its final row.
    pub fn cancel(&self, rule_id: RuleId) -> Option<TimerInfo> {
        let timer = lock(&self.timers).remove(&rule_id)?;
        timer.task.abort();
        tracing::info!(%rule_id, generation = timer.generation, "timer cancelled");
        Some(TimerInfo {
            rule_id,
            generation: timer.generation,
            state: TimerState::Cancelled,
        })
    }

    /// Arm every enabled time-based rule. Returns how many were armed.
    pub fn restore(&self, rules: &[AutomationRule]) -> usize {
        let armed = rules
            .iter()
            .filter(|rule| rule.is_scheduled())
            .filter_map(|rule| self.register(rule))
            .count();
        tracing::info!(armed, "scheduler restored");
        armed
    }

    /// Whether `request` comes from the rule's current timer.
    #[must_use]
    pub fn is_current(&self, request: &FireRequest) -> bool {
        lock(&self.timers)
            .get(&request.rule_id)
            .is_some_and(|timer| timer.generation == request.generation)
    }

    #[must_use]
    pub fn timers(&self) -> Vec<TimerInfo> {
        let mut rows: Vec<TimerInfo> = lock(&self.timers)
            .iter()
            .map(|(rule_id, timer)| TimerInfo {
                rule_id: *rule_id,
                generation: timer.generation,
                state: timer.state,
            })
            .collect();
        rows.sort_by_key(|row| row.generation);
        rows
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut timers = lock(&self.timers);
        for (_, timer) in timers.drain() {
            timer.task.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct TimerTask {
    timers: TimerTable,
    fire_tx: mpsc::UnboundedSender<FireRequest>,
    clock: Clock,
    rule_id: RuleId,
    generation: u64,
    schedule: Schedule,
}

impl TimerTask {
    /// Sleep until the clock reads at least `until`.
    async fn sleep_until(&self, until: Timestamp) {
        loop {
            let now = (self.clock)();
            if now >= until {
                return;
            }
            let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
    }

    fn transition(&self, state: TimerState) -> bool {
        transition(&self.timers, self.rule_id, self.generation, state)
    }
}

async fn run_timer(task: TimerTask, mut next_fire: Timestamp) {
    let rule_id = task.rule_id;
    let generation = task.generation;
    loop {
        task.sleep_until(next_fire).await;

        if !task.transition(TimerState::Firing) {
            return;
        }
        let request = FireRequest {
            rule_id,
            generation,
            scheduled_for: next_fire,
        };
        if task.fire_tx.send(request).is_err() {
            tracing::debug!(%rule_id, "fire channel closed, timer stopping");
            return;
        }
        tracing::debug!(%rule_id, generation, scheduled_for = %next_fire, "timer fired");

        if !task.transition(TimerState::Rearming) {
            return;
        }
        // Never before the slot that just fired, even if the wall clock lags.
        let reference = (task.clock)().max(next_fire);
        let Some(next) = task.schedule.next_execution(reference) else {
            tracing::warn!(%rule_id, schedule = %task.schedule, "schedule exhausted, timer stopping");
            let mut table = lock(&task.timers);
            if table.get(&rule_id).is_some_and(|t| t.generation == generation) {
                table.remove(&rule_id);
            }
            return;
        };
        next_fire = next;
        if !task.transition(TimerState::Armed { next_fire }) {
            return;
        }
    }
}
