//! Liveness and readiness reporting.

use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the quiz store and report the registry size.
pub async fn healthcheck(state: &SharedState) -> HealthResponse {
    let active_sessions = state.registry().len();
    match state.quiz_store().health_check().await {
        Ok(()) => HealthResponse::ok(active_sessions),
        Err(err) => {
            warn!(error = %err, "quiz store health check failed");
            HealthResponse::degraded(active_sessions)
        }
    }
}
