//! Shared application state and session runtime types.

/// Answer records and scoring.
pub mod ledger;
/// Leaderboard derivation.
pub mod leaderboard;
/// Immutable quiz content.
pub mod quiz;
/// Live-session index.
pub mod registry;
/// Per-session runtime aggregate.
pub mod session;
/// Session lifecycle state machine.
pub mod state_machine;

use std::sync::Arc;

use crate::{config::AppConfig, dao::quiz_store::QuizStore, state::registry::SessionRegistry};

/// Shared reference to the application state.
pub type SharedState = Arc<AppState>;

/// Process-wide state handed to every route and socket handler.
pub struct AppState {
    config: AppConfig,
    registry: Arc<SessionRegistry>,
    quiz_store: Arc<dyn QuizStore>,
}

impl AppState {
    /// Assemble the state from its long-lived parts.
    pub fn new(config: AppConfig, quiz_store: Arc<dyn QuizStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.pin_length));
        Self {
            config,
            registry,
            quiz_store,
        }
    }

    /// Application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live-session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Quiz storage backend.
    pub fn quiz_store(&self) -> &Arc<dyn QuizStore> {
        &self.quiz_store
    }
}
