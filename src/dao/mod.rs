//! Access layer for the external quiz-storage service.

/// Wire documents exchanged with the quiz service.
pub mod models;
/// Quiz store trait and its backends.
pub mod quiz_store;
/// Backend-agnostic storage errors.
pub mod storage;
