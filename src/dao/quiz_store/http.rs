//! HTTP backend for the quiz store, talking to the remote quiz service.

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use uuid::Uuid;

use crate::dao::{
    models::{FinalScoreDocument, QuizDocument},
    quiz_store::QuizStore,
    storage::{StoreError, StoreResult},
};

/// Quiz store reaching the quiz service over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpQuizStore {
    client: Client,
    base_url: String,
}

impl HttpQuizStore {
    /// Build a store rooted at `base_url` (trailing slashes are tolerated).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

impl QuizStore for HttpQuizStore {
    fn quiz_by_id(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<QuizDocument>>> {
        let client = self.client.clone();
        let url = format!("{}/quizzes/{id}", self.base_url);
        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|err| StoreError::unavailable(format!("GET {url} failed"), err))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let response = response
                .error_for_status()
                .map_err(|err| StoreError::unavailable(format!("GET {url} failed"), err))?;

            let document = response
                .json::<QuizDocument>()
                .await
                .map_err(|err| StoreError::Malformed(err.to_string()))?;

            Ok(Some(document))
        })
    }

    fn persist_final_scores(
        &self,
        session_id: Uuid,
        scores: Vec<FinalScoreDocument>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.client.clone();
        let url = format!("{}/game-sessions/{session_id}/scores", self.base_url);
        Box::pin(async move {
            client
                .post(&url)
                .json(&scores)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|err| StoreError::unavailable(format!("POST {url} failed"), err))?;

            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.client.clone();
        let url = format!("{}/healthcheck", self.base_url);
        Box::pin(async move {
            client
                .get(&url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|err| StoreError::unavailable(format!("GET {url} failed"), err))?;

            Ok(())
        })
    }
}
