//! Shared application state for axum handlers.

use std::sync::Arc;

use upkeep_app::engine::Engine;

/// State shared across all axum handlers.
///
/// `Clone` is implemented manually so the store and entity source types do
/// not need to be `Clone`; only the `Arc` is cloned.
pub struct AppState<S, E> {
    pub engine: Arc<Engine<S, E>>,
}

impl<S, E> Clone for AppState<S, E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S, E> AppState<S, E> {
    /// Wrap an engine that is already shared with the background loops.
    pub fn new(engine: Arc<Engine<S, E>>) -> Self {
        Self { engine }
    }
}
