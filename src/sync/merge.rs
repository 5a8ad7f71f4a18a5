//! Deterministic local/remote merge rules. Pure functions, no IO.

use crate::domain::{Achievement, Preferences, Progress};

/// Monotonic counters take the element-wise max. `current_streak` follows
/// whichever side was updated later (local on ties). Accuracy is re-derived.
pub fn merge_progress(local: &Progress, remote: &Progress) -> Progress {
    let mut merged = local.clone();
    merged.raise_to(remote);

    if remote.updated_at > local.updated_at {
        merged.current_streak = remote.current_streak;
    }
    merged.last_played = match (local.last_played, remote.last_played) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    merged.updated_at = local.updated_at.max(remote.updated_at);
    merged.normalize();
    merged
}

/// Remote wins for synced fields. Theme, language and unknown keys are
/// never uploaded, so they always come from `local`.
pub fn merge_settings(local: &Preferences, remote: &Preferences) -> Preferences {
    Preferences {
        theme: local.theme,
        language: local.language.clone(),
        extra: local.extra.clone(),
        updated_at: local.updated_at.max(remote.updated_at),
        ..remote.clone()
    }
}

fn merge_one(a: &Achievement, b: &Achievement) -> Achievement {
    Achievement {
        id: a.id.clone(),
        name: if a.name.is_empty() { b.name.clone() } else { a.name.clone() },
        progress: a.progress.max(b.progress),
        unlocked_at: match (a.unlocked_at, b.unlocked_at) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        },
        updated_at: a.updated_at.max(b.updated_at),
    }
}

/// Union by id. Local order is kept; remote-only entries are appended.
pub fn merge_achievements(local: &[Achievement], remote: &[Achievement]) -> Vec<Achievement> {
    let mut merged: Vec<Achievement> = local.to_vec();
    for theirs in remote {
        match merged.iter_mut().find(|a| a.id == theirs.id) {
            Some(mine) => *mine = merge_one(mine, theirs),
            None => merged.push(theirs.clone()),
        }
    }
    merged
}

/// True if `a` and `b` agree on everything the remote stores.
pub fn same_achievement(a: &Achievement, b: &Achievement) -> bool {
    a.id == b.id && a.progress == b.progress && a.unlocked_at == b.unlocked_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Theme;

    fn progress(games: u64, questions: u64, correct: u64, best: u64) -> Progress {
        Progress {
            games_played: games,
            questions_answered: questions,
            correct_answers: correct,
            best_streak: best,
            ..Default::default()
        }
    }

    #[test]
    fn monotonic_counters_take_max() {
        let merged = merge_progress(&progress(3, 30, 24, 5), &progress(5, 40, 35, 4));
        assert_eq!(merged.counters(), progress(5, 40, 35, 5).counters());
        assert_eq!(merged.accuracy, 0.875);
    }

    #[test]
    fn current_streak_follows_newer_side() {
        let mut local = progress(1, 1, 1, 3);
        local.current_streak = 3;
        local.updated_at = 10;
        let mut remote = progress(1, 1, 1, 3);
        remote.current_streak = 1;
        remote.updated_at = 20;

        assert_eq!(merge_progress(&local, &remote).current_streak, 1);
        remote.updated_at = 10;
        assert_eq!(merge_progress(&local, &remote).current_streak, 3);
    }

    #[test]
    fn settings_keep_device_local_fields() {
        let mut local = Preferences::default();
        local.theme = Theme::Dark;
        local.language = "de".into();
        let mut remote = Preferences::default();
        remote.sound_enabled = false;

        let merged = merge_settings(&local, &remote);
        assert!(!merged.sound_enabled);
        assert_eq!(merged.theme, Theme::Dark);
        assert_eq!(merged.language, "de");
    }

    #[test]
    fn achievements_union_with_earliest_unlock() {
        let mut a = Achievement::new("streak5", "Streak 5").with_progress(100);
        a.unlocked_at = Some(500);
        let local = vec![a, Achievement::new("first_game", "First game").with_progress(100)];

        let mut r = Achievement::new("streak5", "Streak 5").with_progress(60);
        r.unlocked_at = Some(300);
        let remote = vec![r, Achievement::new("questions_100", "").with_progress(40)];

        let merged = merge_achievements(&local, &remote);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].progress, 100);
        assert_eq!(merged[0].unlocked_at, Some(300));
        assert_eq!(merged[2].id, "questions_100");
    }
}
