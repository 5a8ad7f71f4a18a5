use serde::{Deserialize, Serialize};

use crate::domain::preferences::AgeGroup;
use crate::persistence::codec::Schema;

/// One completed play of one mini-game. Only `synced` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub game_type: String,
    pub started_at: u64,
    pub ended_at: u64,
    pub questions_answered: u64,
    pub correct_answers: u64,
    pub accuracy: f64,
    /// Milliseconds.
    pub time_spent: u64,
    pub longest_streak: u64,
    pub hints_used: u64,
    pub score: u64,
    pub difficulty: u8,
    #[serde(default)]
    pub age_group: AgeGroup,
    #[serde(default)]
    pub synced: bool,
}

impl Schema for SessionRecord {
    const NAME: &'static str = "SessionRecord";

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("empty session id".into());
        }
        if self.correct_answers > self.questions_answered {
            return Err("correctAnswers exceeds questionsAnswered".into());
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(format!("accuracy {} outside [0, 1]", self.accuracy));
        }
        if self.ended_at < self.started_at {
            return Err("endedAt precedes startedAt".into());
        }
        Ok(())
    }
}
