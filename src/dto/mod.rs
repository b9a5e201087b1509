//! Data-transfer objects for the HTTP API and the WebSocket protocol.

/// Session REST payloads and shared view types.
pub mod game;
/// Healthcheck payloads.
pub mod health;
/// WebSocket protocol messages.
pub mod ws;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Format a timestamp as RFC 3339 for wire payloads.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}
