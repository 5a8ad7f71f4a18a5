use crate::domain::{Achievement, Progress, SessionRecord};

/// Measures `(current, target)` for one rule.
type Measure = fn(&Progress, &SessionRecord) -> (u64, u64);

struct Rule {
    id: &'static str,
    name: &'static str,
    measure: Measure,
}

const RULES: &[Rule] = &[
    Rule {
        id: "first_game",
        name: "First Game",
        measure: |p, _| (p.games_played, 1),
    },
    Rule {
        id: "streak_5",
        name: "Five in a Row",
        measure: |p, _| (p.best_streak, 5),
    },
    Rule {
        id: "streak_10",
        name: "Ten in a Row",
        measure: |p, _| (p.best_streak, 10),
    },
    Rule {
        id: "perfect_session",
        name: "Perfect Game",
        measure: |_, s| {
            let perfect = s.questions_answered >= 5 && s.correct_answers == s.questions_answered;
            (u64::from(perfect), 1)
        },
    },
    Rule {
        id: "questions_100",
        name: "Hundred Questions",
        measure: |p, _| (p.questions_answered, 100),
    },
];

/// Built-in achievement rules, evaluated after each session.
#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementTracker;

impl AchievementTracker {
    pub fn new() -> Self {
        Self
    }

    /// Achievements whose progress moved past what `existing` holds. The
    /// repository stamps `unlocked_at` for the ones that reached 100.
    pub fn evaluate(&self, progress: &Progress, session: &SessionRecord, existing: &[Achievement]) -> Vec<Achievement> {
        RULES
            .iter()
            .filter_map(|rule| {
                let (current, target) = (rule.measure)(progress, session);
                let percent = (current.saturating_mul(100) / target.max(1)).min(100) as u8;
                let before = existing.iter().find(|a| a.id == rule.id);
                match before {
                    Some(a) if a.progress >= percent => None,
                    None if percent == 0 => None,
                    _ => Some(Achievement::new(rule.id, rule.name).with_progress(percent)),
                }
            })
            .collect()
    }
}
