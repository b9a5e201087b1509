use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle states of a live quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session exists but no player has joined yet.
    Created,
    /// Lobby: at least one player joined, waiting for the host to start.
    Waiting,
    /// Pre-question countdown is running.
    Countdown,
    /// A question is open and answers are being accepted.
    InProgress,
    /// The current question is closed and results are on display.
    ResultsReady,
    /// External settlement step; no core behavior beyond holding the state.
    Payout,
    /// Terminal state; the session keeps its record until retention expires.
    Completed,
}

impl SessionState {
    /// Whether the session admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The first player joined an empty session.
    FirstPlayerJoined,
    /// The host started the game.
    HostStarted,
    /// The pre-question countdown reached zero.
    CountdownFinished,
    /// The question window closed (timer expiry or everyone answered).
    QuestionClosed,
    /// The host advanced to the next question.
    HostAdvanced,
    /// The host requested external settlement after the last question.
    PayoutRequested,
    /// The session finished normally.
    Finished,
    /// The session was aborted from a non-terminal state.
    Aborted,
}

/// Error returned when an event cannot be applied from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// State the machine was in when the invalid event was received.
    pub from: SessionState,
    /// The event that cannot be applied from this state.
    pub event: SessionEvent,
}

/// State machine implementing the session lifecycle.
///
/// Every mutation goes through [`SessionStateMachine::apply`], which validates
/// the transition first; a rejected event leaves the state untouched. The
/// per-session worker serializes all callers, so no further locking is needed.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionState,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            state: SessionState::Created,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine in the `Created` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply an event, returning the new state or an error without mutating.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.state = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute the state an event would lead to, if the transition is valid.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionState, InvalidTransition> {
        let next = match (self.state, event) {
            (SessionState::Created, SessionEvent::FirstPlayerJoined) => SessionState::Waiting,
            (SessionState::Waiting, SessionEvent::HostStarted) => SessionState::Countdown,
            (SessionState::Countdown, SessionEvent::CountdownFinished) => SessionState::InProgress,
            (SessionState::InProgress, SessionEvent::QuestionClosed) => SessionState::ResultsReady,
            (SessionState::ResultsReady, SessionEvent::HostAdvanced) => SessionState::Countdown,
            (SessionState::ResultsReady, SessionEvent::PayoutRequested) => SessionState::Payout,
            (SessionState::ResultsReady | SessionState::Payout, SessionEvent::Finished) => {
                SessionState::Completed
            }
            (from, SessionEvent::Aborted) if !from.is_terminal() => SessionState::Completed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
