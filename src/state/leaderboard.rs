//! Leaderboard derivation from participant standings.

use crate::{dao::models::FinalScoreDocument, state::session::Participant};
use indexmap::IndexMap;

/// One ranked row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// 1-based rank after sorting.
    pub rank: usize,
    /// Player display name.
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

/// Rank participants by score descending, then fewest wrong answers, then
/// join order. The input map iterates in join order and the sort is stable,
/// so full ties keep their insertion ranking.
pub fn standings(participants: &IndexMap<String, Participant>) -> Vec<Standing> {
    let mut rows: Vec<Standing> = participants
        .values()
        .map(|participant| Standing {
            rank: 0,
            player_name: participant.name.clone(),
            total_score: participant.total_score,
            correct_count: participant.correct_count,
            wrong_count: participant.wrong_count,
            current_streak: participant.current_streak,
            best_streak: participant.best_streak,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.wrong_count.cmp(&b.wrong_count))
    });

    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }
    rows
}

impl From<Standing> for FinalScoreDocument {
    fn from(standing: Standing) -> Self {
        Self {
            player_name: standing.player_name,
            total_score: standing.total_score,
            correct_count: standing.correct_count,
            wrong_count: standing.wrong_count,
            best_streak: standing.best_streak,
        }
    }
}
