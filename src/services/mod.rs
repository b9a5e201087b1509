//! Service layer: session workers, transport, and supporting services.

/// OpenAPI document assembly.
pub mod documentation;
/// Session creation and REST read model.
pub mod game_service;
/// Liveness and readiness reporting.
pub mod health_service;
/// Per-session worker actor.
pub mod session_worker;
/// Per-session clock.
pub mod timer;
/// WebSocket transport.
pub mod websocket_service;
