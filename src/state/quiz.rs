//! Immutable quiz content as used by running sessions.
//!
//! Documents fetched from the quiz service are converted into these runtime
//! types once, at session creation, and shared read-only afterwards.

use std::time::Duration;

use uuid::Uuid;

use crate::dao::models::{AnswerDocument, QuestionDocument, QuizDocument};

/// A quiz loaded for play.
#[derive(Debug, Clone)]
pub struct Quiz {
    /// Identifier of the quiz in the upstream service.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Ordered questions.
    pub questions: Vec<Question>,
}

/// A single question with its answer options.
#[derive(Debug, Clone)]
pub struct Question {
    /// Identifier of the question.
    pub id: Uuid,
    /// Question text shown to players.
    pub text: String,
    /// Answer options in display order.
    pub answers: Vec<AnswerOption>,
    /// Per-question override of the answer window, when present.
    pub time_limit: Option<Duration>,
}

/// One selectable answer option.
#[derive(Debug, Clone)]
pub struct AnswerOption {
    /// Identifier of the option.
    pub id: Uuid,
    /// Option text.
    pub text: String,
    /// Whether selecting this option counts as correct.
    pub correct: bool,
}

impl Question {
    /// Whether `answer_id` names one of this question's options.
    pub fn has_answer(&self, answer_id: Uuid) -> bool {
        self.answers.iter().any(|answer| answer.id == answer_id)
    }

    /// Whether `answer_id` names a correct option.
    pub fn is_correct(&self, answer_id: Uuid) -> bool {
        self.answers
            .iter()
            .any(|answer| answer.id == answer_id && answer.correct)
    }

    /// Identifiers of all correct options.
    pub fn correct_answer_ids(&self) -> Vec<Uuid> {
        self.answers
            .iter()
            .filter(|answer| answer.correct)
            .map(|answer| answer.id)
            .collect()
    }
}

impl From<QuizDocument> for Quiz {
    fn from(document: QuizDocument) -> Self {
        Self {
            id: document.id,
            title: document.title,
            questions: document.questions.into_iter().map(Question::from).collect(),
        }
    }
}

impl From<QuestionDocument> for Question {
    fn from(document: QuestionDocument) -> Self {
        Self {
            id: document.id,
            text: document.question,
            answers: document
                .answers
                .into_iter()
                .map(AnswerOption::from)
                .collect(),
            time_limit: document.time_limit_seconds.map(Duration::from_secs),
        }
    }
}

impl From<AnswerDocument> for AnswerOption {
    fn from(document: AnswerDocument) -> Self {
        Self {
            id: document.id,
            text: document.answer,
            correct: document.correct_answer,
        }
    }
}
