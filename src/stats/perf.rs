use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{accuracy_of, SessionRecord};
use crate::persistence::Schema;

/// Running numbers for one game type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GamePerformance {
    pub sessions: u64,
    pub questions_answered: u64,
    pub correct_answers: u64,
    pub accuracy: f64,
    pub avg_response_ms: u64,
    pub last_difficulty: u8,
    pub last_played: Option<u64>,
}

/// Learning-analytics cache stored under `perf:<identityKey>`. Local only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceCache {
    pub games: BTreeMap<String, GamePerformance>,
}

impl Schema for PerformanceCache {
    const NAME: &'static str = "PerformanceCache";
}

impl PerformanceCache {
    /// Folds one finished session in. `response_ms_total` is the sum of
    /// response times of its attempts.
    pub fn record(&mut self, session: &SessionRecord, response_ms_total: u64) {
        let game = self.games.entry(session.game_type.clone()).or_default();

        let answered_before = game.questions_answered;
        let weighted = game.avg_response_ms * answered_before + response_ms_total;

        game.sessions += 1;
        game.questions_answered += session.questions_answered;
        game.correct_answers += session.correct_answers;
        game.accuracy = accuracy_of(game.correct_answers, game.questions_answered);
        game.avg_response_ms = weighted / game.questions_answered.max(1);
        game.last_difficulty = session.difficulty;
        game.last_played = Some(session.ended_at);
    }

    pub fn game(&self, game_type: &str) -> Option<&GamePerformance> {
        self.games.get(game_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgeGroup;

    fn session(questions: u64, correct: u64) -> SessionRecord {
        SessionRecord {
            id: "s".into(),
            game_type: "money".into(),
            started_at: 0,
            ended_at: 10,
            questions_answered: questions,
            correct_answers: correct,
            accuracy: accuracy_of(correct, questions),
            time_spent: 10,
            longest_streak: 0,
            hints_used: 0,
            score: 0,
            difficulty: 3,
            age_group: AgeGroup::default(),
            synced: false,
        }
    }

    #[test]
    fn averages_are_weighted_by_questions() {
        let mut cache = PerformanceCache::default();
        cache.record(&session(2, 2), 2_000);
        cache.record(&session(2, 0), 6_000);

        let money = cache.game("money").unwrap();
        assert_eq!(money.sessions, 2);
        assert_eq!(money.accuracy, 0.5);
        assert_eq!(money.avg_response_ms, 2_000);
        assert_eq!(money.last_difficulty, 3);
    }
}
