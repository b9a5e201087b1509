//! Append-only record of answer submissions with scoring.
//!
//! The ledger is the single authority on who answered what: duplicate and
//! invalid submissions are rejected here, and the awarded points are computed
//! at insertion time so a record never changes after it is written.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{error::ServiceError, state::quiz::Question};

/// Points awarded for any correct answer before bonuses.
pub const BASE_POINTS: u64 = 100;
/// Additional points per consecutive correct answer already on the streak.
pub const STREAK_BONUS_STEP: u64 = 50;
/// Maximum speed bonus, awarded for an instantaneous answer.
pub const SPEED_BONUS_MAX: f64 = 50.0;

/// One accepted submission.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    /// Option the player selected.
    pub answer_id: Uuid,
    /// Whether the selection was correct.
    pub correct: bool,
    /// Points awarded, zero when incorrect.
    pub points: u64,
    /// Milliseconds between question start and submission.
    pub time_to_answer_ms: u64,
}

/// Per-session answer ledger keyed by question and player.
#[derive(Debug, Default)]
pub struct AnswerLedger {
    records: HashMap<(Uuid, String), AnswerRecord>,
}

impl AnswerLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission, scoring it in the same step.
    ///
    /// `remaining_fraction` is the unexpired share of the answer window in
    /// `[0, 1]`. `within_window` is false for submissions that arrived during
    /// the post-close grace period; those are accepted but scored incorrect
    /// regardless of the selected option. `streak_before` is the player's
    /// streak going into this question.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        question: &Question,
        player_key: &str,
        answer_id: Uuid,
        time_to_answer_ms: u64,
        remaining_fraction: f64,
        within_window: bool,
        streak_before: u32,
    ) -> Result<&AnswerRecord, ServiceError> {
        let key = (question.id, player_key.to_string());
        if self.records.contains_key(&key) {
            return Err(ServiceError::DuplicateAnswer);
        }
        if !question.has_answer(answer_id) {
            return Err(ServiceError::InvalidAnswer(format!(
                "answer {answer_id} does not belong to question {}",
                question.id
            )));
        }

        let correct = within_window && question.is_correct(answer_id);
        let points = if correct {
            let speed_bonus = (remaining_fraction.clamp(0.0, 1.0) * SPEED_BONUS_MAX).floor() as u64;
            BASE_POINTS + u64::from(streak_before) * STREAK_BONUS_STEP + speed_bonus
        } else {
            0
        };

        let record = AnswerRecord {
            answer_id,
            correct,
            points,
            time_to_answer_ms,
        };
        Ok(self.records.entry(key).or_insert(record))
    }

    /// Whether the player already answered the question.
    pub fn has_answered(&self, question_id: Uuid, player_key: &str) -> bool {
        self.records
            .contains_key(&(question_id, player_key.to_string()))
    }

    /// Number of submissions recorded for the question.
    pub fn answered_count(&self, question_id: Uuid) -> usize {
        self.records
            .keys()
            .filter(|(question, _)| *question == question_id)
            .count()
    }

    /// Look up the record for a player's answer to a question.
    pub fn record(&self, question_id: Uuid, player_key: &str) -> Option<&AnswerRecord> {
        self.records.get(&(question_id, player_key.to_string()))
    }
}
