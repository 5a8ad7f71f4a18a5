use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persistence::codec::Schema;

/// Cumulative progress for one identity.
///
/// `games_played`, `questions_answered`, `correct_answers`, `time_spent`,
/// `best_streak`, `level` and `xp` only ever grow. `current_streak` can
/// drop back to zero and `accuracy` is always derived.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
    pub games_played: u64,
    pub questions_answered: u64,
    pub correct_answers: u64,
    /// Milliseconds.
    pub time_spent: u64,
    pub best_streak: u64,
    pub level: u64,
    pub xp: u64,
    pub current_streak: u64,
    pub accuracy: f64,
    pub last_played: Option<u64>,
    pub updated_at: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `correct / max(1, answered)`.
pub fn accuracy_of(correct: u64, answered: u64) -> f64 {
    correct as f64 / answered.max(1) as f64
}

impl Progress {
    pub fn recompute_accuracy(&mut self) {
        self.accuracy = accuracy_of(self.correct_answers, self.questions_answered);
    }

    /// The monotonic counters in a fixed order.
    pub fn counters(&self) -> [u64; 7] {
        [
            self.games_played,
            self.questions_answered,
            self.correct_answers,
            self.time_spent,
            self.best_streak,
            self.level,
            self.xp,
        ]
    }

    fn counters_mut(&mut self) -> [&mut u64; 7] {
        [
            &mut self.games_played,
            &mut self.questions_answered,
            &mut self.correct_answers,
            &mut self.time_spent,
            &mut self.best_streak,
            &mut self.level,
            &mut self.xp,
        ]
    }

    /// Raises every monotonic counter to at least `floor`'s value.
    /// Returns `true` if anything had to be raised.
    pub fn raise_to(&mut self, floor: &Progress) -> bool {
        let mut raised = false;
        for (mine, theirs) in self.counters_mut().into_iter().zip(floor.counters()) {
            if *mine < theirs {
                *mine = theirs;
                raised = true;
            }
        }
        raised
    }

    /// Restores `best_streak >= current_streak` and re-derives accuracy.
    pub fn normalize(&mut self) {
        self.best_streak = self.best_streak.max(self.current_streak);
        self.recompute_accuracy();
    }

    pub fn same_counters(&self, other: &Progress) -> bool {
        self.counters() == other.counters() && self.current_streak == other.current_streak
    }
}

impl Schema for Progress {
    const NAME: &'static str = "Progress";

    fn validate(&self) -> Result<(), String> {
        if self.correct_answers > self.questions_answered {
            return Err(format!(
                "correctAnswers ({}) exceeds questionsAnswered ({})",
                self.correct_answers, self.questions_answered
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_denominator_never_zero() {
        assert_eq!(accuracy_of(0, 0), 0.0);
        let mut p = Progress::default();
        p.recompute_accuracy();
        assert_eq!(p.accuracy, 0.0);
    }

    #[test]
    fn raise_to_is_elementwise() {
        let mut a = Progress {
            games_played: 3,
            questions_answered: 30,
            best_streak: 5,
            ..Default::default()
        };
        let b = Progress {
            games_played: 5,
            questions_answered: 20,
            best_streak: 4,
            ..Default::default()
        };
        assert!(a.raise_to(&b));
        assert_eq!((a.games_played, a.questions_answered, a.best_streak), (5, 30, 5));
        assert!(!a.raise_to(&b));
    }
}
