//! REST payloads and view types shared with the WebSocket protocol.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::state::{
    leaderboard::Standing,
    quiz::Question,
    state_machine::SessionState,
};

/// Request body for creating a session.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Quiz to play, as known to the quiz service.
    pub quiz_id: Uuid,
    /// Countdown override in seconds.
    #[validate(range(min = 1, max = 60))]
    pub countdown_seconds: Option<u64>,
    /// Answer-window override in seconds.
    #[validate(range(min = 5, max = 300))]
    pub question_seconds: Option<u64>,
    /// Lobby-size override.
    #[validate(range(min = 1, max = 500))]
    pub max_players: Option<usize>,
}

/// Response body after a session was created.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// Identifier of the new session.
    pub session_id: Uuid,
    /// Pin players use to join.
    pub pin: String,
    /// Capability token for host-only operations. Shown once; treat as a
    /// secret.
    pub host_token: Uuid,
    /// Title of the quiz being played.
    pub title: String,
    /// Number of questions in the quiz.
    pub question_count: usize,
}

/// Read-model snapshot of a session.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSessionView {
    /// Session identifier.
    pub session_id: Uuid,
    /// Join pin.
    pub pin: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Quiz title.
    pub title: String,
    /// Number of questions in the quiz.
    pub question_count: usize,
    /// 0-based index of the question in play, once started.
    pub current_question_index: Option<usize>,
    /// Whole seconds left in the open answer window.
    pub seconds_remaining: Option<u64>,
    /// Players in join order.
    pub participants: Vec<ParticipantSummary>,
    /// Current ranking.
    pub leaderboard: Vec<LeaderboardRow>,
    /// Creation time, RFC 3339.
    pub created_at: String,
    /// Start time, RFC 3339, once started.
    pub started_at: Option<String>,
    /// End time, RFC 3339, once completed.
    pub ended_at: Option<String>,
}

/// Compact participant entry in a session snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    /// Display name.
    pub name: String,
    /// Whether the player is currently online.
    pub connected: bool,
    /// Accumulated score.
    pub total_score: u64,
}

/// One row of a leaderboard as sent on the wire.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    /// 1-based rank.
    pub rank: usize,
    /// Display name.
    pub player_name: String,
    /// Accumulated score.
    pub total_score: u64,
    /// Questions answered correctly.
    pub correct_count: u32,
    /// Questions answered incorrectly.
    pub wrong_count: u32,
    /// Current streak.
    pub current_streak: u32,
    /// Best streak reached.
    pub best_streak: u32,
}

impl From<Standing> for LeaderboardRow {
    fn from(standing: Standing) -> Self {
        Self {
            rank: standing.rank,
            player_name: standing.player_name,
            total_score: standing.total_score,
            correct_count: standing.correct_count,
            wrong_count: standing.wrong_count,
            current_streak: standing.current_streak,
            best_streak: standing.best_streak,
        }
    }
}

/// Convert ranked standings into wire rows.
pub fn leaderboard_rows(standings: Vec<Standing>) -> Vec<LeaderboardRow> {
    standings.into_iter().map(LeaderboardRow::from).collect()
}

/// A question as pushed to clients when its round starts.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    /// Question identifier.
    pub question_id: Uuid,
    /// 0-based position within the quiz.
    pub index: usize,
    /// Total number of questions.
    pub total: usize,
    /// Question text.
    pub question: String,
    /// Options in display order.
    pub answers: Vec<AnswerChoice>,
    /// Length of the answer window in seconds.
    pub time_limit_seconds: u64,
    /// When the answer window opened, RFC 3339.
    pub started_at: String,
}

/// One answer option on the wire. The correctness flag is present only in
/// payloads addressed to the host.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerChoice {
    /// Option identifier.
    pub id: Uuid,
    /// Option text.
    pub answer: String,
    /// Correctness flag, host payloads only.
    pub correct_answer: Option<bool>,
}

impl QuestionPayload {
    /// Build the payload for `question`, revealing correctness flags only
    /// when `include_correct` is set.
    pub fn from_question(
        question: &Question,
        index: usize,
        total: usize,
        time_limit_seconds: u64,
        started_at: String,
        include_correct: bool,
    ) -> Self {
        Self {
            question_id: question.id,
            index,
            total,
            question: question.text.clone(),
            answers: question
                .answers
                .iter()
                .map(|answer| AnswerChoice {
                    id: answer.id,
                    answer: answer.text.clone(),
                    correct_answer: include_correct.then_some(answer.correct),
                })
                .collect(),
            time_limit_seconds,
            started_at,
        }
    }
}
