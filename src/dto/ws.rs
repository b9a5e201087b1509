//! WebSocket protocol messages.
//!
//! Every frame is a JSON object tagged by `type` with a kebab-case event name
//! and camelCase payload fields.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::game::{GameSessionView, LeaderboardRow, ParticipantSummary, QuestionPayload};

/// Frames accepted from clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// A player joins (or rejoins) a session by pin.
    JoinGame {
        /// Session join pin.
        pin: String,
        /// Desired display name.
        player_name: String,
    },
    /// The host attaches to a session it created.
    HostJoin {
        /// Session join pin.
        pin: String,
        /// Capability token returned at session creation.
        host_token: Uuid,
    },
    /// A player leaves the session, releasing the connection. The score
    /// record stays behind for a later rejoin.
    LeaveGame,
    /// Host only: start the game.
    StartGame,
    /// A player submits an answer to the open question.
    SubmitAnswer {
        /// Question being answered; must match the active question.
        question_id: Uuid,
        /// Selected option.
        answer_id: Uuid,
        /// Client-measured elapsed milliseconds, informational only; the
        /// server clock stays authoritative for scoring.
        #[serde(default)]
        client_elapsed_ms: Option<u64>,
    },
    /// Host only: advance to the next question or finish the quiz.
    NextQuestion,
    /// Host only: abort the session immediately.
    EndGame,
    /// Any frame with an unrecognized `type`.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Frames pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Acknowledges a join with a full session snapshot.
    JoinedGame {
        /// Snapshot of the session as the player sees it.
        session: GameSessionView,
        /// The name the player is registered under.
        player_name: String,
        /// Whether this join resumed an existing participant.
        resumed: bool,
    },
    /// Acknowledges a host attach with a full session snapshot.
    HostJoined {
        /// Snapshot of the session including correctness flags.
        session: GameSessionView,
    },
    /// A player entered the lobby.
    PlayerJoined {
        /// Display name of the new player.
        player_name: String,
        /// Roster after the join, in join order.
        participants: Vec<ParticipantSummary>,
        /// Number of players currently connected.
        connected_players: usize,
    },
    /// A player left; their seat and score record are kept.
    PlayerLeft {
        /// Display name of the departed player.
        player_name: String,
        /// Roster after the departure, in join order.
        participants: Vec<ParticipantSummary>,
        /// Number of players currently connected.
        connected_players: usize,
    },
    /// A player's connection dropped; the seat is kept for resumption.
    PlayerDisconnected {
        /// Display name of the disconnected player.
        player_name: String,
        /// Roster after the drop, in join order.
        participants: Vec<ParticipantSummary>,
        /// Number of players currently connected.
        connected_players: usize,
    },
    /// The host started the game; the first countdown begins.
    GameStarted {
        /// Number of questions that will be played.
        question_count: usize,
        /// Countdown length in seconds.
        countdown_seconds: u64,
    },
    /// One tick of the pre-question countdown.
    CountdownTick {
        /// Whole seconds until the question opens.
        seconds_remaining: u64,
    },
    /// A question opened for answers.
    QuestionStarted {
        /// The question payload; correctness flags are host-only.
        question: QuestionPayload,
    },
    /// One tick of the open answer window.
    TimeUpdate {
        /// Whole seconds left to answer.
        seconds_remaining: u64,
    },
    /// Private feedback to the submitting player.
    AnswerSubmitted {
        /// Whether the answer was correct.
        correct: bool,
        /// Points awarded for this answer.
        points: u64,
        /// Player's score after this answer.
        new_score: u64,
        /// Player's streak after this answer.
        current_streak: u32,
    },
    /// Host notification that some player answered.
    PlayerAnswered {
        /// Display name of the player who answered.
        player_name: String,
        /// Submissions recorded for the open question so far.
        answered_count: usize,
        /// Players currently connected.
        connected_players: usize,
    },
    /// The question closed; correct answers and standings are revealed.
    QuestionResults {
        /// Question that was just closed.
        question_id: Uuid,
        /// Identifiers of the correct options.
        correct_answer_ids: Vec<Uuid>,
        /// Ranking after this question.
        leaderboard: Vec<LeaderboardRow>,
    },
    /// The session completed.
    GameEnded {
        /// Final ranking.
        leaderboard: Vec<LeaderboardRow>,
        /// Whether the session was aborted rather than played to the end.
        aborted: bool,
    },
    /// An operation failed; the connection stays usable.
    Error {
        /// Stable error kind, e.g. `name-taken`.
        code: String,
        /// Human-readable description.
        message: String,
    },
}
