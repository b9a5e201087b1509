//! Wire documents exchanged with the external quiz-storage service.
//!
//! The quiz service speaks camelCase JSON; these types mirror its documents
//! exactly and are converted into runtime types by the `state` module.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable quiz document as served by the quiz-storage service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDocument {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title of the quiz.
    pub title: String,
    /// Ordered list of questions.
    pub questions: Vec<QuestionDocument>,
}

/// One question inside a quiz document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDocument {
    /// Stable identifier of the question.
    pub id: Uuid,
    /// Question text shown to players.
    pub question: String,
    /// Ordered list of answer choices.
    pub answers: Vec<AnswerDocument>,
    /// Optional per-question answering window in seconds; the session default
    /// applies when absent.
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
}

/// One answer choice inside a question document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDocument {
    /// Stable identifier of the answer.
    pub id: Uuid,
    /// Answer text shown to players.
    pub answer: String,
    /// Whether this answer is part of the question's correct set.
    pub correct_answer: bool,
}

/// Final standing of one player, pushed to the quiz service when a session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScoreDocument {
    /// Display name of the player.
    pub player_name: String,
    /// Total points accumulated over the session.
    pub total_score: u64,
    /// Number of correctly answered questions.
    pub correct_count: u32,
    /// Number of incorrectly answered questions.
    pub wrong_count: u32,
    /// Longest streak of consecutive correct answers.
    pub best_streak: u32,
}
