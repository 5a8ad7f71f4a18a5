//! Per-session statistics, the difficulty signal, built-in achievements
//! and the per-game performance cache.

pub mod achievements;
pub mod adapt;
pub mod aggregator;
pub mod perf;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::domain::AgeGroup;

pub use achievements::AchievementTracker;
pub use adapt::{adapt, Adaptation};
pub use aggregator::{score, SessionOutcome, StatisticsAggregator};
pub use perf::{GamePerformance, PerformanceCache};

/// One answered question, as reported by a mini-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub game_type: String,
    pub is_correct: bool,
    pub response_time_ms: u64,
    #[serde(default)]
    pub hint_used: bool,
    pub difficulty: u8,
    #[serde(default)]
    pub age_group: AgeGroup,
    pub timestamp: u64,
}

impl Attempt {
    pub fn new(game_type: impl Into<String>, is_correct: bool, response_time_ms: u64) -> Self {
        Self {
            game_type: game_type.into(),
            is_correct,
            response_time_ms,
            hint_used: false,
            difficulty: 1,
            age_group: AgeGroup::default(),
            timestamp: 0,
        }
    }

    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_hint(mut self) -> Self {
        self.hint_used = true;
        self
    }
}
