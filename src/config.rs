//! Application configuration loaded from a JSON file.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::state::session::SessionRules;

const DEFAULT_CONFIG_PATH: &str = "config/app.json";
const CONFIG_PATH_ENV: &str = "QUIZ_BACK_CONFIG_PATH";

/// On-disk configuration shape; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    countdown_seconds: Option<u64>,
    question_seconds: Option<u64>,
    answer_grace_ms: Option<u64>,
    pin_length: Option<u32>,
    max_players: Option<usize>,
    completed_retention_seconds: Option<u64>,
}

/// Resolved configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Pre-question countdown length in seconds.
    pub countdown_seconds: u64,
    /// Default answer window in seconds.
    pub question_seconds: u64,
    /// Grace period after the answer window, in milliseconds.
    pub answer_grace_ms: u64,
    /// Number of digits in session join pins.
    pub pin_length: u32,
    /// Maximum players per session.
    pub max_players: usize,
    /// How long a completed session stays resolvable by pin, in seconds.
    pub completed_retention_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 5,
            question_seconds: 10,
            answer_grace_ms: 500,
            pin_length: 6,
            max_players: 50,
            completed_retention_seconds: 60,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            countdown_seconds: raw.countdown_seconds.unwrap_or(defaults.countdown_seconds),
            question_seconds: raw.question_seconds.unwrap_or(defaults.question_seconds),
            answer_grace_ms: raw.answer_grace_ms.unwrap_or(defaults.answer_grace_ms),
            pin_length: raw.pin_length.unwrap_or(defaults.pin_length),
            max_players: raw.max_players.unwrap_or(defaults.max_players),
            completed_retention_seconds: raw
                .completed_retention_seconds
                .unwrap_or(defaults.completed_retention_seconds),
        }
    }
}

impl AppConfig {
    /// Load the configuration file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => raw.into(),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "invalid config file, using defaults");
                    AppConfig::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config file not readable, using defaults");
                AppConfig::default()
            }
        }
    }

    /// Session rules derived from this configuration.
    pub fn default_rules(&self) -> SessionRules {
        SessionRules {
            countdown: Duration::from_secs(self.countdown_seconds),
            question: Duration::from_secs(self.question_seconds),
            answer_grace: Duration::from_millis(self.answer_grace_ms),
            max_players: self.max_players,
        }
    }

    /// Retention of completed sessions as a [`Duration`].
    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_seconds)
    }
}
