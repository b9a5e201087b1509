//! HTTP and WebSocket routing.

/// Swagger UI.
pub mod docs;
/// Session endpoints.
pub mod game;
/// Healthcheck endpoint.
pub mod health;
/// WebSocket upgrade endpoint.
pub mod websocket;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedState;

/// Assemble the full application router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .merge(game::router())
        .merge(health::router())
        .merge(websocket::router())
        .merge(docs::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
