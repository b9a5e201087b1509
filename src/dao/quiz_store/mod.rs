//! Narrow read/write interface to the external quiz-storage service.
//!
//! The session core only ever fetches immutable quiz content and pushes final
//! scores; everything else the quiz service does (authoring, publishing) is
//! out of scope here.

#[cfg(feature = "http-store")]
pub mod http;
pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{FinalScoreDocument, QuizDocument},
    storage::StoreResult,
};

/// Abstraction over the quiz-storage service consumed by the session core.
pub trait QuizStore: Send + Sync {
    /// Fetch an immutable quiz document by its identifier.
    fn quiz_by_id(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<QuizDocument>>>;
    /// Persist the final leaderboard of a completed session.
    fn persist_final_scores(
        &self,
        session_id: Uuid,
        scores: Vec<FinalScoreDocument>,
    ) -> BoxFuture<'static, StoreResult<()>>;
    /// Check that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>>;
}
