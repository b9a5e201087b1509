//! Per-session worker task.
//!
//! Every live session is owned by exactly one worker. All inputs — client
//! commands, clock ticks, snapshot queries — arrive on a single queue, so
//! session state is mutated from one place only and submissions for the same
//! (question, player) key serialize naturally.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::FinalScoreDocument, quiz_store::QuizStore},
    dto::{
        format_timestamp,
        game::{GameSessionView, ParticipantSummary, QuestionPayload, leaderboard_rows},
        ws::ServerMessage,
    },
    error::ServiceError,
    services::timer::TimerEngine,
    state::{
        leaderboard::standings,
        quiz::Quiz,
        registry::{SessionHandle, SessionRegistry},
        session::{ConnectionHandle, GameSession, Participant, SessionRules},
        state_machine::{SessionEvent, SessionState},
    },
};

/// Attempts made to persist final scores before giving up.
const PERSIST_ATTEMPTS: u32 = 4;
/// Initial delay between persistence attempts; doubles each retry.
const PERSIST_BACKOFF: Duration = Duration::from_millis(500);

/// Inputs processed by a session worker.
#[derive(Debug)]
pub enum Command {
    /// A player joins or resumes by name.
    Join {
        /// Requested display name.
        player_name: String,
        /// Connection to bind the player to.
        conn: ConnectionHandle,
    },
    /// The host attaches with its capability token.
    HostAttach {
        /// Token returned at session creation.
        host_token: Uuid,
        /// Connection to bind the host to.
        conn: ConnectionHandle,
    },
    /// A player leaves; the seat and its score record are kept for a later
    /// rejoin.
    Leave {
        /// Connection the request arrived on.
        connection_id: Uuid,
    },
    /// A connection dropped; the participant's seat is kept for resumption.
    Disconnected {
        /// Connection that went away.
        connection_id: Uuid,
    },
    /// Host only: start the game.
    Start {
        /// Connection the request arrived on.
        connection_id: Uuid,
    },
    /// A player answers the open question.
    SubmitAnswer {
        /// Connection the request arrived on.
        connection_id: Uuid,
        /// Question being answered.
        question_id: Uuid,
        /// Selected option.
        answer_id: Uuid,
        /// Client-measured elapsed milliseconds, informational only.
        client_elapsed_ms: Option<u64>,
    },
    /// Host only: advance to the next question or finish.
    Advance {
        /// Connection the request arrived on.
        connection_id: Uuid,
    },
    /// Host only: abort the session.
    End {
        /// Connection the request arrived on.
        connection_id: Uuid,
    },
    /// One-second tick from the session clock.
    ClockTick {
        /// Clock generation the tick belongs to.
        generation: u64,
        /// Whole seconds left on the clock.
        seconds_remaining: u64,
    },
    /// The session clock reached its deadline.
    ClockElapsed {
        /// Clock generation that expired.
        generation: u64,
    },
    /// Read-model query answered with a point-in-time snapshot.
    Snapshot {
        /// Channel the snapshot is returned on.
        reply: oneshot::Sender<GameSessionView>,
    },
    /// Final removal of the session after its retention window.
    Teardown,
}

/// Stable wire code for a service error.
pub(crate) fn error_code(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::NotFound(_) => "not-found",
        ServiceError::NameTaken(_) => "name-taken",
        ServiceError::DuplicateAnswer => "duplicate-answer",
        ServiceError::InvalidAnswer(_) => "invalid-answer",
        ServiceError::InvalidStateTransition(_) => "invalid-state-transition",
        ServiceError::Unauthorized(_) => "unauthorized",
        ServiceError::InvalidInput(_) => "invalid-input",
        ServiceError::Upstream(_) => "upstream-unavailable",
    }
}

/// Task owning one [`GameSession`] and its clock.
pub struct SessionWorker {
    session: GameSession,
    clock: TimerEngine,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    registry: Arc<SessionRegistry>,
    quiz_store: Arc<dyn QuizStore>,
    retention: Duration,
    grace_deadline: Option<Instant>,
}

impl SessionWorker {
    /// Spawn the worker for a new session. Returns the registry handle and
    /// the host capability token.
    pub fn spawn(
        session_id: Uuid,
        pin: String,
        quiz: Arc<Quiz>,
        rules: SessionRules,
        retention: Duration,
        registry: Arc<SessionRegistry>,
        quiz_store: Arc<dyn QuizStore>,
    ) -> (SessionHandle, Uuid) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let session = GameSession::new(session_id, pin.clone(), quiz, rules);
        let host_token = session.host_token;

        let worker = SessionWorker {
            clock: TimerEngine::new(commands_tx.clone()),
            session,
            commands_tx: commands_tx.clone(),
            commands_rx,
            registry,
            quiz_store,
            retention,
            grace_deadline: None,
        };
        tokio::spawn(worker.run());

        (
            SessionHandle {
                id: session_id,
                pin,
                commands: commands_tx,
            },
            host_token,
        )
    }

    async fn run(mut self) {
        while let Some(command) = self.commands_rx.recv().await {
            if matches!(command, Command::Teardown) {
                break;
            }
            self.handle(command);
        }
        self.registry.remove(self.session.id);
        info!(session = %self.session.id, "session torn down");
    }

    fn handle(&mut self, command: Command) {
        let origin = match &command {
            Command::Join { conn, .. } | Command::HostAttach { conn, .. } => Some(conn.clone()),
            Command::Start { connection_id }
            | Command::SubmitAnswer { connection_id, .. }
            | Command::Advance { connection_id }
            | Command::End { connection_id }
            | Command::Leave { connection_id } => self.find_connection(*connection_id),
            _ => None,
        };

        if self.session.faulted {
            if let Some(conn) = origin {
                conn.send(ServerMessage::Error {
                    code: "internal-error".to_string(),
                    message: "session is faulted".to_string(),
                });
            }
            return;
        }

        let result = match command {
            Command::Join { player_name, conn } => self.join(player_name, conn),
            Command::HostAttach { host_token, conn } => self.host_attach(host_token, conn),
            Command::Leave { connection_id } => self.leave(connection_id),
            Command::Disconnected { connection_id } => self.disconnected(connection_id),
            Command::Start { connection_id } => self.start(connection_id),
            Command::SubmitAnswer {
                connection_id,
                question_id,
                answer_id,
                client_elapsed_ms,
            } => self.submit(connection_id, question_id, answer_id, client_elapsed_ms),
            Command::Advance { connection_id } => self.advance(connection_id),
            Command::End { connection_id } => self.end(connection_id),
            Command::ClockTick {
                generation,
                seconds_remaining,
            } => {
                self.clock_tick(generation, seconds_remaining);
                Ok(())
            }
            Command::ClockElapsed { generation } => self.clock_elapsed(generation),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session_view());
                Ok(())
            }
            Command::Teardown => Ok(()),
        };

        if let Err(err) = result {
            warn!(session = %self.session.id, error = %err, "command rejected");
            if let Some(conn) = origin {
                conn.send(ServerMessage::Error {
                    code: error_code(&err).to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    fn join(&mut self, player_name: String, conn: ConnectionHandle) -> Result<(), ServiceError> {
        let name = player_name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput(
                "player name must not be empty".to_string(),
            ));
        }
        if self.session.lifecycle.state().is_terminal() {
            return Err(ServiceError::invalid_state("session has ended"));
        }

        let key = GameSession::participant_key(&name);
        let (registered_name, resumed) =
            if let Some(participant) = self.session.participants.get_mut(&key) {
                if participant.connection.is_some() {
                    return Err(ServiceError::NameTaken(participant.name.clone()));
                }
                participant.connection = Some(conn.clone());
                (participant.name.clone(), true)
            } else {
                if self.session.participants.len() >= self.session.rules.max_players {
                    return Err(ServiceError::invalid_state("session is full"));
                }
                if self.session.lifecycle.state() == SessionState::Created {
                    self.session.lifecycle.apply(SessionEvent::FirstPlayerJoined)?;
                }
                self.session
                    .participants
                    .insert(key, Participant::new(name.clone(), conn.clone()));
                (name, false)
            };
        conn.send(ServerMessage::JoinedGame {
            session: self.session_view(),
            player_name: registered_name.clone(),
            resumed,
        });
        if let Some(frame) = self.active_question_frame(false) {
            conn.send(frame);
        }

        let connected_players = self.session.connected_players();
        self.broadcast_except(
            conn.id,
            ServerMessage::PlayerJoined {
                player_name: registered_name.clone(),
                participants: self.participant_summaries(),
                connected_players,
            },
        );
        info!(session = %self.session.id, player = %registered_name, resumed, "player joined");
        Ok(())
    }

    fn host_attach(&mut self, host_token: Uuid, conn: ConnectionHandle) -> Result<(), ServiceError> {
        if host_token != self.session.host_token {
            return Err(ServiceError::Unauthorized("invalid host token".to_string()));
        }
        self.session.host_connection = Some(conn.clone());
        conn.send(ServerMessage::HostJoined {
            session: self.session_view(),
        });
        if let Some(frame) = self.active_question_frame(true) {
            conn.send(frame);
        }
        info!(session = %self.session.id, "host attached");
        Ok(())
    }

    fn require_host(&self, connection_id: Uuid) -> Result<(), ServiceError> {
        match &self.session.host_connection {
            Some(host) if host.id == connection_id => Ok(()),
            _ => Err(ServiceError::Unauthorized(
                "host connection required".to_string(),
            )),
        }
    }

    fn start(&mut self, connection_id: Uuid) -> Result<(), ServiceError> {
        self.require_host(connection_id)?;
        self.session.lifecycle.apply(SessionEvent::HostStarted)?;
        self.session.started_at = Some(OffsetDateTime::now_utc());
        self.session.current_question = Some(0);
        self.clock.start(self.session.rules.countdown);

        self.broadcast_all(ServerMessage::GameStarted {
            question_count: self.session.quiz.questions.len(),
            countdown_seconds: self.session.rules.countdown.as_secs(),
        });
        info!(session = %self.session.id, "game started");
        Ok(())
    }

    fn clock_tick(&self, generation: u64, seconds_remaining: u64) {
        if !self.clock.is_current(generation) {
            return;
        }
        match self.session.lifecycle.state() {
            SessionState::Countdown => {
                self.broadcast_all(ServerMessage::CountdownTick { seconds_remaining });
            }
            SessionState::InProgress => {
                self.broadcast_all(ServerMessage::TimeUpdate { seconds_remaining });
            }
            _ => {}
        }
    }

    fn clock_elapsed(&mut self, generation: u64) -> Result<(), ServiceError> {
        if !self.clock.is_current(generation) {
            return Ok(());
        }
        match self.session.lifecycle.state() {
            SessionState::Countdown => self.begin_question(),
            SessionState::InProgress => self.close_question(),
            _ => Ok(()),
        }
    }

    fn begin_question(&mut self) -> Result<(), ServiceError> {
        let Some(index) = self.session.current_question else {
            self.fault("countdown finished without a question queued");
            return Ok(());
        };
        if index >= self.session.quiz.questions.len() {
            self.fault("question index out of range");
            return Ok(());
        }

        self.session.lifecycle.apply(SessionEvent::CountdownFinished)?;
        let window = self.session.window_for(index);
        let now = Instant::now();
        let opened_at = OffsetDateTime::now_utc();
        self.session.question_window = window;
        self.session.question_started_at = Some(now);
        self.session.question_opened_at = Some(opened_at);
        self.session.question_deadline = Some(now + window);
        self.grace_deadline = None;
        self.clock.start(window);

        let quiz = self.session.quiz.clone();
        let question = &quiz.questions[index];
        let total = quiz.questions.len();
        let seconds = window.as_secs();
        let started_at = format_timestamp(opened_at);
        self.broadcast_players(ServerMessage::QuestionStarted {
            question: QuestionPayload::from_question(
                question,
                index,
                total,
                seconds,
                started_at.clone(),
                false,
            ),
        });
        self.send_host(ServerMessage::QuestionStarted {
            question: QuestionPayload::from_question(
                question,
                index,
                total,
                seconds,
                started_at,
                true,
            ),
        });
        info!(session = %self.session.id, question = index, "question opened");
        Ok(())
    }

    fn submit(
        &mut self,
        connection_id: Uuid,
        question_id: Uuid,
        answer_id: Uuid,
        client_elapsed_ms: Option<u64>,
    ) -> Result<(), ServiceError> {
        let (key, player_name, streak_before) = {
            let (key, participant) = self
                .session
                .participant_by_connection(connection_id)
                .ok_or_else(|| {
                    ServiceError::Unauthorized("connection is not a joined player".to_string())
                })?;
            (key.clone(), participant.name.clone(), participant.current_streak)
        };

        let now = Instant::now();
        let state = self.session.lifecycle.state();
        let (within_window, remaining_fraction) = match state {
            SessionState::InProgress => {
                let deadline = self
                    .session
                    .question_deadline
                    .ok_or_else(|| ServiceError::invalid_state("no open answer window"))?;
                let remaining = deadline.saturating_duration_since(now);
                let window = self.session.question_window.as_secs_f64();
                (true, remaining.as_secs_f64() / window.max(f64::EPSILON))
            }
            SessionState::ResultsReady
                if self.grace_deadline.is_some_and(|grace| now <= grace) =>
            {
                (false, 0.0)
            }
            _ => {
                return Err(ServiceError::invalid_state(format!(
                    "answers are not accepted in state {state:?}"
                )));
            }
        };

        let quiz = self.session.quiz.clone();
        let question = self
            .session
            .current_question
            .and_then(|index| quiz.questions.get(index))
            .ok_or_else(|| ServiceError::invalid_state("no active question"))?;
        if question.id != question_id {
            return Err(ServiceError::invalid_state(
                "submission does not target the active question",
            ));
        }

        let time_to_answer_ms = self
            .session
            .question_started_at
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or(0);
        if let Some(client_ms) = client_elapsed_ms {
            debug!(
                session = %self.session.id,
                player = %player_name,
                client_ms,
                server_ms = time_to_answer_ms,
                "client-reported answer timing"
            );
        }

        let record = self.session.ledger.submit(
            question,
            &key,
            answer_id,
            time_to_answer_ms,
            remaining_fraction,
            within_window,
            streak_before,
        )?;
        let (correct, points) = (record.correct, record.points);

        let participant = self
            .session
            .participants
            .get_mut(&key)
            .ok_or_else(|| ServiceError::NotFound("player record missing".to_string()))?;
        if correct {
            participant.current_streak += 1;
            participant.best_streak = participant.best_streak.max(participant.current_streak);
            participant.correct_count += 1;
            participant.total_score += points;
        } else {
            participant.current_streak = 0;
            participant.wrong_count += 1;
        }
        let new_score = participant.total_score;
        let current_streak = participant.current_streak;
        if let Some(conn) = participant.connection.clone() {
            conn.send(ServerMessage::AnswerSubmitted {
                correct,
                points,
                new_score,
                current_streak,
            });
        }

        let answered_count = self.session.ledger.answered_count(question.id);
        let connected_players = self.session.connected_players();
        self.send_host(ServerMessage::PlayerAnswered {
            player_name,
            answered_count,
            connected_players,
        });

        if state == SessionState::InProgress && self.all_connected_answered(question.id) {
            self.close_question()?;
        }
        Ok(())
    }

    fn all_connected_answered(&self, question_id: Uuid) -> bool {
        let mut any_connected = false;
        for (key, participant) in &self.session.participants {
            if participant.connection.is_none() {
                continue;
            }
            any_connected = true;
            if !self.session.ledger.has_answered(question_id, key) {
                return false;
            }
        }
        any_connected
    }

    fn close_question(&mut self) -> Result<(), ServiceError> {
        self.clock.cancel();
        self.session.lifecycle.apply(SessionEvent::QuestionClosed)?;
        self.grace_deadline = Some(Instant::now() + self.session.rules.answer_grace);
        self.session.question_deadline = None;

        let (question_id, correct_answer_ids) = {
            let question = self
                .session
                .active_question()
                .ok_or_else(|| ServiceError::invalid_state("no active question"))?;
            (question.id, question.correct_answer_ids())
        };
        let leaderboard = leaderboard_rows(standings(&self.session.participants));
        self.broadcast_all(ServerMessage::QuestionResults {
            question_id,
            correct_answer_ids,
            leaderboard,
        });
        info!(session = %self.session.id, "question closed");
        Ok(())
    }

    fn advance(&mut self, connection_id: Uuid) -> Result<(), ServiceError> {
        self.require_host(connection_id)?;
        let index = self
            .session
            .current_question
            .ok_or_else(|| ServiceError::invalid_state("game has not started"))?;

        let next = index + 1;
        if next < self.session.quiz.questions.len() {
            self.session.lifecycle.apply(SessionEvent::HostAdvanced)?;
            self.session.current_question = Some(next);
            self.grace_deadline = None;
            self.clock.start(self.session.rules.countdown);
            Ok(())
        } else {
            self.finish(false)
        }
    }

    fn end(&mut self, connection_id: Uuid) -> Result<(), ServiceError> {
        self.require_host(connection_id)?;
        self.finish(true)
    }

    fn finish(&mut self, aborted: bool) -> Result<(), ServiceError> {
        self.clock.cancel();
        let event = if aborted {
            SessionEvent::Aborted
        } else {
            SessionEvent::Finished
        };
        self.session.lifecycle.apply(event)?;
        self.session.ended_at = Some(OffsetDateTime::now_utc());
        self.grace_deadline = None;

        let final_standings = standings(&self.session.participants);
        self.broadcast_all(ServerMessage::GameEnded {
            leaderboard: leaderboard_rows(final_standings.clone()),
            aborted,
        });

        let scores: Vec<FinalScoreDocument> =
            final_standings.into_iter().map(Into::into).collect();
        let store = self.quiz_store.clone();
        let session_id = self.session.id;
        tokio::spawn(persist_with_backoff(store, session_id, scores));

        self.schedule_teardown();
        info!(session = %session_id, aborted, "game ended");
        Ok(())
    }

    fn schedule_teardown(&self) {
        let commands = self.commands_tx.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let _ = commands.send(Command::Teardown);
        });
    }

    fn disconnected(&mut self, connection_id: Uuid) -> Result<(), ServiceError> {
        if self
            .session
            .host_connection
            .as_ref()
            .is_some_and(|host| host.id == connection_id)
        {
            self.session.host_connection = None;
            info!(session = %self.session.id, "host disconnected");
            return Ok(());
        }

        let Some((key, _)) = self.session.participant_by_connection(connection_id) else {
            return Ok(());
        };
        let key = key.clone();
        let player_name = {
            let participant = self
                .session
                .participants
                .get_mut(&key)
                .ok_or_else(|| ServiceError::NotFound("player record missing".to_string()))?;
            participant.connection = None;
            participant.name.clone()
        };

        let connected_players = self.session.connected_players();
        self.broadcast_all(ServerMessage::PlayerDisconnected {
            player_name,
            participants: self.participant_summaries(),
            connected_players,
        });
        self.maybe_close_early()
    }

    fn leave(&mut self, connection_id: Uuid) -> Result<(), ServiceError> {
        let Some((key, _)) = self.session.participant_by_connection(connection_id) else {
            return Err(ServiceError::NotFound(
                "no player bound to this connection".to_string(),
            ));
        };
        let key = key.clone();

        // Leaving only releases the connection. The score record stays, so a
        // later rejoin under the same name resumes with progress intact.
        let player_name = {
            let participant = self
                .session
                .participants
                .get_mut(&key)
                .ok_or_else(|| ServiceError::NotFound("player record missing".to_string()))?;
            participant.connection = None;
            participant.name.clone()
        };

        let connected_players = self.session.connected_players();
        self.broadcast_all(ServerMessage::PlayerLeft {
            player_name,
            participants: self.participant_summaries(),
            connected_players,
        });
        self.maybe_close_early()
    }

    fn maybe_close_early(&mut self) -> Result<(), ServiceError> {
        if self.session.lifecycle.state() != SessionState::InProgress {
            return Ok(());
        }
        let Some(question) = self.session.active_question() else {
            return Ok(());
        };
        if self.all_connected_answered(question.id) {
            self.close_question()?;
        }
        Ok(())
    }

    /// Terminate this session after an internal inconsistency, leaving every
    /// other session untouched.
    fn fault(&mut self, context: &str) {
        error!(session = %self.session.id, context, "session faulted");
        self.session.faulted = true;
        self.clock.cancel();
        if !self.session.lifecycle.state().is_terminal() {
            let _ = self.session.lifecycle.apply(SessionEvent::Aborted);
        }
        self.session.ended_at = Some(OffsetDateTime::now_utc());
        self.broadcast_all(ServerMessage::Error {
            code: "internal-error".to_string(),
            message: "session encountered an internal error".to_string(),
        });
        self.broadcast_all(ServerMessage::GameEnded {
            leaderboard: leaderboard_rows(standings(&self.session.participants)),
            aborted: true,
        });
        self.schedule_teardown();
    }

    fn active_question_frame(&self, include_correct: bool) -> Option<ServerMessage> {
        if self.session.lifecycle.state() != SessionState::InProgress {
            return None;
        }
        let index = self.session.current_question?;
        let question = self.session.quiz.questions.get(index)?;
        let remaining = self
            .session
            .question_deadline
            .map(|deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs_f64()
                    .ceil() as u64
            })
            .unwrap_or(0);
        let started_at = self
            .session
            .question_opened_at
            .map(format_timestamp)
            .unwrap_or_default();
        Some(ServerMessage::QuestionStarted {
            question: QuestionPayload::from_question(
                question,
                index,
                self.session.quiz.questions.len(),
                remaining,
                started_at,
                include_correct,
            ),
        })
    }

    fn participant_summaries(&self) -> Vec<ParticipantSummary> {
        self.session
            .participants
            .values()
            .map(|participant| ParticipantSummary {
                name: participant.name.clone(),
                connected: participant.connection.is_some(),
                total_score: participant.total_score,
            })
            .collect()
    }

    fn session_view(&self) -> GameSessionView {
        let seconds_remaining = self.session.question_deadline.map(|deadline| {
            deadline
                .saturating_duration_since(Instant::now())
                .as_secs_f64()
                .ceil() as u64
        });
        GameSessionView {
            session_id: self.session.id,
            pin: self.session.pin.clone(),
            state: self.session.lifecycle.state(),
            title: self.session.quiz.title.clone(),
            question_count: self.session.quiz.questions.len(),
            current_question_index: self.session.current_question,
            seconds_remaining,
            participants: self.participant_summaries(),
            leaderboard: leaderboard_rows(standings(&self.session.participants)),
            created_at: format_timestamp(self.session.created_at),
            started_at: self.session.started_at.map(format_timestamp),
            ended_at: self.session.ended_at.map(format_timestamp),
        }
    }

    fn find_connection(&self, connection_id: Uuid) -> Option<ConnectionHandle> {
        if let Some(host) = &self.session.host_connection {
            if host.id == connection_id {
                return Some(host.clone());
            }
        }
        self.session
            .participant_by_connection(connection_id)
            .and_then(|(_, participant)| participant.connection.clone())
    }

    fn broadcast_all(&self, message: ServerMessage) {
        for participant in self.session.participants.values() {
            if let Some(conn) = &participant.connection {
                conn.send(message.clone());
            }
        }
        self.send_host(message);
    }

    fn broadcast_players(&self, message: ServerMessage) {
        for participant in self.session.participants.values() {
            if let Some(conn) = &participant.connection {
                conn.send(message.clone());
            }
        }
    }

    fn broadcast_except(&self, skip: Uuid, message: ServerMessage) {
        for participant in self.session.participants.values() {
            if let Some(conn) = &participant.connection {
                if conn.id != skip {
                    conn.send(message.clone());
                }
            }
        }
        if let Some(host) = &self.session.host_connection {
            if host.id != skip {
                host.send(message);
            }
        }
    }

    fn send_host(&self, message: ServerMessage) {
        if let Some(host) = &self.session.host_connection {
            host.send(message);
        }
    }
}

async fn persist_with_backoff(
    store: Arc<dyn QuizStore>,
    session_id: Uuid,
    scores: Vec<FinalScoreDocument>,
) {
    let mut delay = PERSIST_BACKOFF;
    for attempt in 1..=PERSIST_ATTEMPTS {
        match store.persist_final_scores(session_id, scores.clone()).await {
            Ok(()) => {
                info!(session = %session_id, "final scores persisted");
                return;
            }
            Err(err) if attempt < PERSIST_ATTEMPTS => {
                warn!(
                    session = %session_id,
                    attempt,
                    error = %err,
                    "persisting final scores failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                error!(session = %session_id, error = %err, "giving up on final score persistence");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::quiz_store::memory::MemoryQuizStore,
        state::quiz::{AnswerOption, Question},
    };
    use tokio::time::{advance, sleep, timeout};

    fn quiz(questions: usize) -> Arc<Quiz> {
        Arc::new(Quiz {
            id: Uuid::new_v4(),
            title: "trivia night".into(),
            questions: (0..questions)
                .map(|i| Question {
                    id: Uuid::new_v4(),
                    text: format!("question {i}"),
                    answers: vec![
                        AnswerOption {
                            id: Uuid::new_v4(),
                            text: "right".into(),
                            correct: true,
                        },
                        AnswerOption {
                            id: Uuid::new_v4(),
                            text: "wrong".into(),
                            correct: false,
                        },
                    ],
                    time_limit: None,
                })
                .collect(),
        })
    }

    fn rules() -> SessionRules {
        SessionRules {
            countdown: Duration::from_secs(2),
            question: Duration::from_secs(10),
            answer_grace: Duration::from_millis(500),
            max_players: 8,
        }
    }

    struct Harness {
        handle: SessionHandle,
        host_token: Uuid,
        quiz: Arc<Quiz>,
        store: Arc<MemoryQuizStore>,
        registry: Arc<SessionRegistry>,
        session_id: Uuid,
    }

    fn harness(questions: usize) -> Harness {
        let registry = Arc::new(SessionRegistry::new(6));
        let store = Arc::new(MemoryQuizStore::new());
        let quiz = quiz(questions);
        let session_id = Uuid::new_v4();
        let pin = registry.allocate_pin(session_id).unwrap();
        let (handle, host_token) = SessionWorker::spawn(
            session_id,
            pin,
            quiz.clone(),
            rules(),
            Duration::from_secs(60),
            registry.clone(),
            store.clone(),
        );
        registry.insert(handle.clone());
        Harness {
            handle,
            host_token,
            quiz,
            store,
            registry,
            session_id,
        }
    }

    struct Client {
        id: Uuid,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn client() -> (ConnectionHandle, Client) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        (ConnectionHandle { id, tx }, Client { id, rx })
    }

    impl Client {
        async fn recv(&mut self) -> ServerMessage {
            timeout(Duration::from_secs(600), self.rx.recv())
                .await
                .expect("no message before timeout")
                .expect("connection channel closed")
        }

        async fn recv_until<T>(&mut self, mut pick: impl FnMut(ServerMessage) -> Option<T>) -> T {
            loop {
                let message = self.recv().await;
                if let Some(value) = pick(message) {
                    return value;
                }
            }
        }
    }

    async fn join(h: &Harness, name: &str) -> Client {
        let (conn, mut client) = client();
        h.handle
            .commands
            .send(Command::Join {
                player_name: name.to_string(),
                conn,
            })
            .unwrap();
        client
            .recv_until(|m| matches!(m, ServerMessage::JoinedGame { .. }).then_some(()))
            .await;
        client
    }

    async fn attach_host(h: &Harness) -> Client {
        let (conn, mut client) = client();
        h.handle
            .commands
            .send(Command::HostAttach {
                host_token: h.host_token,
                conn,
            })
            .unwrap();
        client
            .recv_until(|m| matches!(m, ServerMessage::HostJoined { .. }).then_some(()))
            .await;
        client
    }

    async fn wait_question(client: &mut Client) -> QuestionPayload {
        client
            .recv_until(|m| match m {
                ServerMessage::QuestionStarted { question } => Some(question),
                _ => None,
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn full_round_scores_a_fast_correct_answer() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();

        let question = wait_question(&mut alice).await;
        assert_eq!(question.index, 0);
        assert!(question.answers.iter().all(|a| a.correct_answer.is_none()));

        let host_question = wait_question(&mut host).await;
        assert!(host_question.answers.iter().any(|a| a.correct_answer == Some(true)));

        // Answer correctly 2s into a 10s window: 100 base + 0 streak + 40 speed.
        advance(Duration::from_secs(2)).await;
        let correct_id = h.quiz.questions[0].answers[0].id;
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id: h.quiz.questions[0].id,
                answer_id: correct_id,
                client_elapsed_ms: None,
            })
            .unwrap();

        let (correct, points, new_score, streak) = alice
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted {
                    correct,
                    points,
                    new_score,
                    current_streak,
                } => Some((correct, points, new_score, current_streak)),
                _ => None,
            })
            .await;
        assert!(correct);
        assert_eq!(points, 140);
        assert_eq!(new_score, 140);
        assert_eq!(streak, 1);

        // Every connected player answered, so the question closes early.
        let (question_id, correct_ids, leaderboard) = alice
            .recv_until(|m| match m {
                ServerMessage::QuestionResults {
                    question_id,
                    correct_answer_ids,
                    leaderboard,
                } => Some((question_id, correct_answer_ids, leaderboard)),
                _ => None,
            })
            .await;
        assert_eq!(question_id, h.quiz.questions[0].id);
        assert_eq!(correct_ids, vec![correct_id]);
        assert_eq!(leaderboard[0].player_name, "Alice");
        assert_eq!(leaderboard[0].total_score, 140);

        // No questions left: advancing finishes the game and persists scores.
        h.handle
            .commands
            .send(Command::Advance {
                connection_id: host.id,
            })
            .unwrap();
        let (final_rows, aborted) = alice
            .recv_until(|m| match m {
                ServerMessage::GameEnded {
                    leaderboard,
                    aborted,
                } => Some((leaderboard, aborted)),
                _ => None,
            })
            .await;
        assert!(!aborted);
        assert_eq!(final_rows[0].total_score, 140);

        sleep(Duration::from_millis(10)).await;
        let persisted = h.store.final_scores(h.session_id).unwrap();
        assert_eq!(persisted[0].player_name, "Alice");
        assert_eq!(persisted[0].total_score, 140);
        assert_eq!(persisted[0].correct_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submission_is_rejected_with_score_unchanged() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut bob = join(&h, "Bob").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        let question_id = h.quiz.questions[0].id;
        let correct_id = h.quiz.questions[0].answers[0].id;
        let wrong_id = h.quiz.questions[0].answers[1].id;

        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id,
                answer_id: correct_id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let first_score = alice
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted { new_score, .. } => Some(new_score),
                _ => None,
            })
            .await;

        // Second submission for the same question must not double-score.
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id,
                answer_id: wrong_id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let code = alice
            .recv_until(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .await;
        assert_eq!(code, "duplicate-answer");

        // Bob answers wrong: streak resets, zero points.
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: bob.id,
                question_id,
                answer_id: wrong_id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let (correct, points) = bob
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted {
                    correct, points, ..
                } => Some((correct, points)),
                _ => None,
            })
            .await;
        assert!(!correct);
        assert_eq!(points, 0);

        let leaderboard = alice
            .recv_until(|m| match m {
                ServerMessage::QuestionResults { leaderboard, .. } => Some(leaderboard),
                _ => None,
            })
            .await;
        assert_eq!(leaderboard[0].player_name, "Alice");
        assert_eq!(leaderboard[0].total_score, first_score);
        assert_eq!(leaderboard[1].player_name, "Bob");
        assert_eq!(leaderboard[1].wrong_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_alone_closes_an_unanswered_question() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        // Nobody answers; the clock drives the close on its own.
        let leaderboard = alice
            .recv_until(|m| match m {
                ServerMessage::QuestionResults { leaderboard, .. } => Some(leaderboard),
                _ => None,
            })
            .await;
        assert_eq!(leaderboard.len(), 1);
        assert_eq!(leaderboard[0].total_score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resumes_the_participant_and_allows_submission() {
        let h = harness(1);
        let alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut host).await;

        h.handle
            .commands
            .send(Command::Disconnected {
                connection_id: alice.id,
            })
            .unwrap();

        // Rejoin with a different case of the same name on a new connection.
        let (conn, mut alice2) = client();
        h.handle
            .commands
            .send(Command::Join {
                player_name: "ALICE".to_string(),
                conn,
            })
            .unwrap();
        let (name, resumed) = alice2
            .recv_until(|m| match m {
                ServerMessage::JoinedGame {
                    player_name,
                    resumed,
                    ..
                } => Some((player_name, resumed)),
                _ => None,
            })
            .await;
        assert_eq!(name, "Alice");
        assert!(resumed);

        // The rejoin snapshot is followed by the active question.
        let question = wait_question(&mut alice2).await;
        assert_eq!(question.index, 0);

        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice2.id,
                question_id: h.quiz.questions[0].id,
                answer_id: h.quiz.questions[0].answers[0].id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let correct = alice2
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted { correct, .. } => Some(correct),
                _ => None,
            })
            .await;
        assert!(correct);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_keeps_the_score_record_for_a_later_rejoin() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        advance(Duration::from_secs(2)).await;
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id: h.quiz.questions[0].id,
                answer_id: h.quiz.questions[0].answers[0].id,
                client_elapsed_ms: Some(2_000),
            })
            .unwrap();
        alice
            .recv_until(|m| matches!(m, ServerMessage::AnswerSubmitted { .. }).then_some(()))
            .await;

        h.handle
            .commands
            .send(Command::Leave {
                connection_id: alice.id,
            })
            .unwrap();
        let roster = host
            .recv_until(|m| match m {
                ServerMessage::PlayerLeft { participants, .. } => Some(participants),
                _ => None,
            })
            .await;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Alice");
        assert!(!roster[0].connected);
        assert_eq!(roster[0].total_score, 140);

        // Rejoining under the same name resumes the kept record.
        let (conn, mut alice2) = client();
        h.handle
            .commands
            .send(Command::Join {
                player_name: "Alice".to_string(),
                conn,
            })
            .unwrap();
        let (resumed, view) = alice2
            .recv_until(|m| match m {
                ServerMessage::JoinedGame {
                    resumed, session, ..
                } => Some((resumed, session)),
                _ => None,
            })
            .await;
        assert!(resumed);
        assert_eq!(view.leaderboard[0].player_name, "Alice");
        assert_eq!(view.leaderboard[0].total_score, 140);

        let roster = host
            .recv_until(|m| match m {
                ServerMessage::PlayerJoined { participants, .. } => Some(participants),
                _ => None,
            })
            .await;
        assert_eq!(roster.len(), 1);
        assert!(roster[0].connected);
        assert_eq!(roster[0].total_score, 140);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_name_is_taken_but_disconnected_name_is_not() {
        let h = harness(1);
        let _alice = join(&h, "Alice").await;

        let (conn, mut impostor) = client();
        h.handle
            .commands
            .send(Command::Join {
                player_name: "alice".to_string(),
                conn,
            })
            .unwrap();
        let code = impostor
            .recv_until(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .await;
        assert_eq!(code, "name-taken");
    }

    #[tokio::test(start_paused = true)]
    async fn grace_window_accepts_late_answers_as_incorrect_then_rejects() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut bob = join(&h, "Bob").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        // Let the window expire with no answers.
        alice
            .recv_until(|m| matches!(m, ServerMessage::QuestionResults { .. }).then_some(()))
            .await;

        // Within the grace window a correct pick still scores as incorrect.
        let correct_id = h.quiz.questions[0].answers[0].id;
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: bob.id,
                question_id: h.quiz.questions[0].id,
                answer_id: correct_id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let (correct, points) = bob
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted {
                    correct, points, ..
                } => Some((correct, points)),
                _ => None,
            })
            .await;
        assert!(!correct);
        assert_eq!(points, 0);

        // Past the grace window submissions are rejected outright.
        advance(Duration::from_millis(600)).await;
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id: h.quiz.questions[0].id,
                answer_id: correct_id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let code = alice
            .recv_until(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .await;
        assert_eq!(code, "invalid-state-transition");
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_mid_question_is_rejected_without_mutating_state() {
        let h = harness(2);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        h.handle
            .commands
            .send(Command::Advance {
                connection_id: host.id,
            })
            .unwrap();
        let code = host
            .recv_until(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .await;
        assert_eq!(code, "invalid-state-transition");

        // The question is still open: a submission is accepted normally.
        h.handle
            .commands
            .send(Command::SubmitAnswer {
                connection_id: alice.id,
                question_id: h.quiz.questions[0].id,
                answer_id: h.quiz.questions[0].answers[0].id,
                client_elapsed_ms: None,
            })
            .unwrap();
        let correct = alice
            .recv_until(|m| match m {
                ServerMessage::AnswerSubmitted { correct, .. } => Some(correct),
                _ => None,
            })
            .await;
        assert!(correct);
    }

    #[tokio::test(start_paused = true)]
    async fn host_commands_from_players_are_unauthorized() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let _host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: alice.id,
            })
            .unwrap();
        let code = alice
            .recv_until(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .await;
        assert_eq!(code, "unauthorized");
    }

    #[tokio::test(start_paused = true)]
    async fn aborting_ends_the_game_and_frees_the_pin_after_retention() {
        let h = harness(3);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        h.handle
            .commands
            .send(Command::End {
                connection_id: host.id,
            })
            .unwrap();
        let aborted = alice
            .recv_until(|m| match m {
                ServerMessage::GameEnded { aborted, .. } => Some(aborted),
                _ => None,
            })
            .await;
        assert!(aborted);

        // Still resolvable during the retention window.
        assert!(h.registry.lookup_by_id(h.session_id).is_some());

        advance(Duration::from_secs(61)).await;
        sleep(Duration::from_millis(10)).await;
        assert!(h.registry.lookup_by_id(h.session_id).is_none());
        assert!(h.registry.lookup_by_pin(&h.handle.pin).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn score_persistence_retries_until_the_store_recovers() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;
        h.store.fail_next_persists(2);

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        h.handle
            .commands
            .send(Command::End {
                connection_id: host.id,
            })
            .unwrap();
        alice
            .recv_until(|m| matches!(m, ServerMessage::GameEnded { .. }).then_some(()))
            .await;

        // Two failures at 500ms and 1s backoff, success on the third try.
        sleep(Duration::from_secs(5)).await;
        let persisted = h.store.final_scores(h.session_id).unwrap();
        assert_eq!(persisted[0].player_name, "Alice");
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_receives_the_active_question() {
        let h = harness(1);
        let mut alice = join(&h, "Alice").await;
        let mut host = attach_host(&h).await;

        h.handle
            .commands
            .send(Command::Start {
                connection_id: host.id,
            })
            .unwrap();
        wait_question(&mut alice).await;

        advance(Duration::from_secs(3)).await;
        let (conn, mut late) = client();
        h.handle
            .commands
            .send(Command::Join {
                player_name: "Bob".to_string(),
                conn,
            })
            .unwrap();
        late.recv_until(|m| matches!(m, ServerMessage::JoinedGame { .. }).then_some(()))
            .await;
        let question = wait_question(&mut late).await;
        assert_eq!(question.index, 0);
        assert!(question.time_limit_seconds <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_lobby_state() {
        let h = harness(2);
        let _alice = join(&h, "Alice").await;
        let _bob = join(&h, "Bob").await;

        let (reply, rx) = oneshot::channel();
        h.handle.commands.send(Command::Snapshot { reply }).unwrap();
        let view = rx.await.unwrap();

        assert_eq!(view.state, SessionState::Waiting);
        assert_eq!(view.question_count, 2);
        assert_eq!(view.participants.len(), 2);
        assert_eq!(view.participants[0].name, "Alice");
        assert!(view.participants.iter().all(|p| p.connected));
        assert!(view.started_at.is_none());
    }
}
