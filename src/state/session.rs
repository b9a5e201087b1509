//! Runtime aggregate for one live session.
//!
//! A [`GameSession`] is owned exclusively by its worker task; nothing here is
//! shared or locked. All reads from outside the worker go through snapshot
//! messages on the command queue.

use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::{sync::mpsc, time::Instant};
use uuid::Uuid;

use crate::{
    dto::ws::ServerMessage,
    state::{ledger::AnswerLedger, quiz::Quiz, state_machine::SessionStateMachine},
};

/// Handle to one connected WebSocket, used for fire-and-forget sends.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Identifier assigned when the socket was accepted.
    pub id: Uuid,
    /// Queue drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    /// Queue a message for delivery; a closed connection is silently skipped.
    pub fn send(&self, message: ServerMessage) {
        let _ = self.tx.send(message);
    }
}

/// Tunable timings and limits applied to a session at creation.
#[derive(Debug, Clone, Copy)]
pub struct SessionRules {
    /// Pre-question countdown length.
    pub countdown: Duration,
    /// Default answer window, overridable per question.
    pub question: Duration,
    /// Grace period after the window during which late answers are still
    /// recorded (as incorrect).
    pub answer_grace: Duration,
    /// Maximum number of players admitted to the lobby.
    pub max_players: usize,
}

/// One player's standing within a session.
#[derive(Debug)]
pub struct Participant {
    /// Display name as originally entered (the map key is its lowercase form).
    pub name: String,
    /// Currently bound connection, if the player is online.
    pub connection: Option<ConnectionHandle>,
    /// Accumulated score.
    pub total_score: u64,
    /// Consecutive correct answers up to and including the latest question.
    pub current_streak: u32,
    /// Longest streak reached during the session.
    pub best_streak: u32,
    /// Questions answered correctly.
    pub correct_count: u32,
    /// Questions answered incorrectly.
    pub wrong_count: u32,
}

impl Participant {
    /// New participant bound to the given connection.
    pub fn new(name: String, connection: ConnectionHandle) -> Self {
        Self {
            name,
            connection: Some(connection),
            total_score: 0,
            current_streak: 0,
            best_streak: 0,
            correct_count: 0,
            wrong_count: 0,
        }
    }
}

/// Full mutable state of one session, owned by its worker.
#[derive(Debug)]
pub struct GameSession {
    /// Session identifier.
    pub id: Uuid,
    /// Join pin handed to players.
    pub pin: String,
    /// Capability token authorizing host-only operations.
    pub host_token: Uuid,
    /// The quiz being played.
    pub quiz: Arc<Quiz>,
    /// Timings and limits.
    pub rules: SessionRules,
    /// Lifecycle state machine.
    pub lifecycle: SessionStateMachine,
    /// Index of the question currently in play, once started.
    pub current_question: Option<usize>,
    /// Deadline of the open answer window, while a question is in progress.
    pub question_deadline: Option<Instant>,
    /// Length of the open answer window.
    pub question_window: Duration,
    /// When the open answer window started, monotonic.
    pub question_started_at: Option<Instant>,
    /// When the open answer window started, wall clock, for wire payloads.
    pub question_opened_at: Option<OffsetDateTime>,
    /// Wall-clock creation time.
    pub created_at: OffsetDateTime,
    /// Wall-clock start time, once the host starts the game.
    pub started_at: Option<OffsetDateTime>,
    /// Wall-clock end time, once the session completes.
    pub ended_at: Option<OffsetDateTime>,
    /// Players in join order, keyed by lowercase name.
    pub participants: IndexMap<String, Participant>,
    /// Answer records and scoring.
    pub ledger: AnswerLedger,
    /// The host's connection, when online.
    pub host_connection: Option<ConnectionHandle>,
    /// Set when an internal error corrupted the session; all subsequent
    /// commands are rejected.
    pub faulted: bool,
}

impl GameSession {
    /// Build a fresh session around a loaded quiz.
    pub fn new(id: Uuid, pin: String, quiz: Arc<Quiz>, rules: SessionRules) -> Self {
        Self {
            id,
            pin,
            host_token: Uuid::new_v4(),
            quiz,
            rules,
            lifecycle: SessionStateMachine::new(),
            current_question: None,
            question_deadline: None,
            question_window: rules.question,
            question_started_at: None,
            question_opened_at: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            ended_at: None,
            participants: IndexMap::new(),
            ledger: AnswerLedger::new(),
            host_connection: None,
            faulted: false,
        }
    }

    /// Canonical participant key for a display name.
    pub fn participant_key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Find the participant bound to a connection, with its key.
    pub fn participant_by_connection(
        &self,
        connection_id: Uuid,
    ) -> Option<(&String, &Participant)> {
        self.participants.iter().find(|(_, participant)| {
            participant
                .connection
                .as_ref()
                .is_some_and(|conn| conn.id == connection_id)
        })
    }

    /// Number of participants currently online.
    pub fn connected_players(&self) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.connection.is_some())
            .count()
    }

    /// The question currently in play.
    pub fn active_question(&self) -> Option<&crate::state::quiz::Question> {
        self.current_question
            .and_then(|index| self.quiz.questions.get(index))
    }

    /// Answer window for the question at `index`, honoring overrides.
    pub fn window_for(&self, index: usize) -> Duration {
        self.quiz
            .questions
            .get(index)
            .and_then(|question| question.time_limit)
            .unwrap_or(self.rules.question)
    }
}
