//! Session creation and the REST read model.

use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::game::{CreateSessionRequest, GameSessionView, SessionCreated},
    error::ServiceError,
    services::session_worker::{Command, SessionWorker},
    state::{SharedState, quiz::Quiz},
};

/// Fetch the quiz, validate it, and spawn a worker for a new session.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionCreated, ServiceError> {
    let document = state
        .quiz_store()
        .quiz_by_id(request.quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz {} not found", request.quiz_id)))?;
    let quiz = Quiz::from(document);
    validate_quiz(&quiz)?;

    let mut rules = state.config().default_rules();
    if let Some(seconds) = request.countdown_seconds {
        rules.countdown = Duration::from_secs(seconds);
    }
    if let Some(seconds) = request.question_seconds {
        rules.question = Duration::from_secs(seconds);
    }
    if let Some(max_players) = request.max_players {
        rules.max_players = max_players;
    }

    let session_id = Uuid::new_v4();
    let pin = state.registry().allocate_pin(session_id)?;
    let title = quiz.title.clone();
    let question_count = quiz.questions.len();

    let (handle, host_token) = SessionWorker::spawn(
        session_id,
        pin.clone(),
        Arc::new(quiz),
        rules,
        state.config().completed_retention(),
        state.registry().clone(),
        state.quiz_store().clone(),
    );
    state.registry().insert(handle);

    info!(session = %session_id, pin = %pin, quiz = %request.quiz_id, "session created");
    Ok(SessionCreated {
        session_id,
        pin,
        host_token,
        title,
        question_count,
    })
}

/// Point-in-time snapshot of a session, resolved by pin.
pub async fn session_view(state: &SharedState, pin: &str) -> Result<GameSessionView, ServiceError> {
    let session = state
        .registry()
        .lookup_by_pin(pin)
        .ok_or_else(|| ServiceError::NotFound(format!("no session with pin {pin}")))?;

    let (reply, response) = oneshot::channel();
    session
        .commands
        .send(Command::Snapshot { reply })
        .map_err(|_| ServiceError::NotFound("session is shutting down".to_string()))?;
    response
        .await
        .map_err(|_| ServiceError::NotFound("session is shutting down".to_string()))
}

/// A playable quiz has at least one question, each with at least two answers
/// and at least one correct one.
fn validate_quiz(quiz: &Quiz) -> Result<(), ServiceError> {
    if quiz.questions.is_empty() {
        return Err(ServiceError::InvalidInput(
            "quiz has no questions".to_string(),
        ));
    }
    for question in &quiz.questions {
        if question.answers.len() < 2 {
            return Err(ServiceError::InvalidInput(format!(
                "question {} needs at least two answers",
                question.id
            )));
        }
        if !question.answers.iter().any(|answer| answer.correct) {
            return Err(ServiceError::InvalidInput(format!(
                "question {} has no correct answer",
                question.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{AnswerDocument, QuestionDocument, QuizDocument},
            quiz_store::memory::MemoryQuizStore,
        },
        state::{AppState, state_machine::SessionState},
    };

    fn quiz_document() -> QuizDocument {
        QuizDocument {
            id: Uuid::new_v4(),
            title: "capitals".into(),
            questions: vec![QuestionDocument {
                id: Uuid::new_v4(),
                question: "capital of France?".into(),
                answers: vec![
                    AnswerDocument {
                        id: Uuid::new_v4(),
                        answer: "Paris".into(),
                        correct_answer: true,
                    },
                    AnswerDocument {
                        id: Uuid::new_v4(),
                        answer: "Lyon".into(),
                        correct_answer: false,
                    },
                ],
                time_limit_seconds: None,
            }],
        }
    }

    fn shared_state(store: Arc<MemoryQuizStore>) -> SharedState {
        Arc::new(AppState::new(AppConfig::default(), store))
    }

    #[tokio::test]
    async fn create_session_registers_a_worker_under_a_pin() {
        let store = Arc::new(MemoryQuizStore::new());
        let document = quiz_document();
        let quiz_id = document.id;
        store.insert_quiz(document);
        let state = shared_state(store);

        let created = create_session(
            &state,
            CreateSessionRequest {
                quiz_id,
                countdown_seconds: Some(3),
                question_seconds: None,
                max_players: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(created.title, "capitals");
        assert_eq!(created.question_count, 1);
        assert_eq!(created.pin.len(), 6);

        let view = session_view(&state, &created.pin).await.unwrap();
        assert_eq!(view.session_id, created.session_id);
        assert_eq!(view.state, SessionState::Created);
        assert!(view.participants.is_empty());
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let state = shared_state(Arc::new(MemoryQuizStore::new()));
        let err = create_session(
            &state,
            CreateSessionRequest {
                quiz_id: Uuid::new_v4(),
                countdown_seconds: None,
                question_seconds: None,
                max_players: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_pin_is_not_found() {
        let state = shared_state(Arc::new(MemoryQuizStore::new()));
        let err = session_view(&state, "000000").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn quiz_validation_rejects_degenerate_content() {
        let mut quiz = Quiz::from(quiz_document());
        assert!(validate_quiz(&quiz).is_ok());

        quiz.questions[0].answers.truncate(1);
        assert!(validate_quiz(&quiz).is_err());

        let mut quiz = Quiz::from(quiz_document());
        for answer in &mut quiz.questions[0].answers {
            answer.correct = false;
        }
        assert!(validate_quiz(&quiz).is_err());

        let empty = Quiz {
            id: Uuid::new_v4(),
            title: "empty".into(),
            questions: vec![],
        };
        assert!(validate_quiz(&empty).is_err());
    }
}
