//! Backend for real-time multiplayer quiz games.
//!
//! Hosts create a session for a quiz, players join by pin over WebSocket, and
//! a per-session worker drives the round lifecycle: countdown, timed answer
//! window, scoring, leaderboard, and final score persistence to the external
//! quiz service.

/// Application configuration.
pub mod config;
/// Access layer for the external quiz-storage service.
pub mod dao;
/// HTTP and WebSocket payloads.
pub mod dto;
/// Error taxonomy.
pub mod error;
/// HTTP and WebSocket routing.
pub mod routes;
/// Service layer.
pub mod services;
/// Shared state and session runtime.
pub mod state;
