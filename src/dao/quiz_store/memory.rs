//! In-memory quiz store used by tests and as a demo-mode fallback when no
//! upstream quiz service is configured.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{FinalScoreDocument, QuizDocument},
    quiz_store::QuizStore,
    storage::{StoreError, StoreResult},
};

/// Quiz store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryQuizStore {
    quizzes: DashMap<Uuid, QuizDocument>,
    persisted: Mutex<HashMap<Uuid, Vec<FinalScoreDocument>>>,
    persist_failures: AtomicU32,
}

impl MemoryQuizStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a quiz document so sessions can be created against it.
    pub fn insert_quiz(&self, quiz: QuizDocument) {
        self.quizzes.insert(quiz.id, quiz);
    }

    /// Final scores recorded for a session, if any were persisted.
    pub fn final_scores(&self, session_id: Uuid) -> Option<Vec<FinalScoreDocument>> {
        self.persisted
            .lock()
            .expect("final scores lock poisoned")
            .get(&session_id)
            .cloned()
    }

    /// Make the next `count` persistence calls fail, for retry testing.
    pub fn fail_next_persists(&self, count: u32) {
        self.persist_failures.store(count, Ordering::SeqCst);
    }
}

impl QuizStore for MemoryQuizStore {
    fn quiz_by_id(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<QuizDocument>>> {
        let quiz = self.quizzes.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn persist_final_scores(
        &self,
        session_id: Uuid,
        scores: Vec<FinalScoreDocument>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let remaining = self.persist_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.persist_failures.store(remaining - 1, Ordering::SeqCst);
            return Box::pin(async move {
                Err(StoreError::Malformed("injected persistence failure".into()))
            });
        }

        self.persisted
            .lock()
            .expect("final scores lock poisoned")
            .insert(session_id, scores);
        Box::pin(async move { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
