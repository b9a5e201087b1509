//! Healthcheck payloads.

use serde::Serialize;
use utoipa::ToSchema;

/// Body of the healthcheck response.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` when the quiz store is reachable, `degraded` otherwise.
    pub status: String,
    /// Number of live sessions in the registry.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// Healthy response.
    pub fn ok(active_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
        }
    }

    /// Degraded response, used when the quiz store is unreachable.
    pub fn degraded(active_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_sessions,
        }
    }
}
