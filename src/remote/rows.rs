//! Mapping between local entities and the remote row shapes.
//!
//! Remote timestamps are integer milliseconds. A missing column reads as the
//! field's default; a column of the wrong type is a `SchemaMismatch`.

use serde_json::{json, Value};

use crate::domain::{Achievement, AgeGroup, Preferences, Progress, SessionRecord, TextSize, UserProfile};
use crate::error::{RemoteError, RemoteResult};
use crate::persistence::codec;
use crate::remote::types::Row;

fn mismatch(table: &str, column: &str, got: &Value) -> RemoteError {
    RemoteError::SchemaMismatch(format!("{table}.{column}: unexpected value {got}"))
}

fn u64_col(row: &Row, table: &str, column: &str) -> RemoteResult<u64> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .ok_or_else(|| mismatch(table, column, v)),
    }
}

fn opt_u64_col(row: &Row, table: &str, column: &str) -> RemoteResult<Option<u64>> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => u64_col(row, table, column).map(Some),
    }
}

fn bool_col(row: &Row, table: &str, column: &str, default: bool) -> RemoteResult<bool> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(v) => Err(mismatch(table, column, v)),
    }
}

fn str_col(row: &Row, table: &str, column: &str) -> RemoteResult<String> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v) => Err(mismatch(table, column, v)),
    }
}

fn enum_col<T: serde::de::DeserializeOwned>(row: &Row, table: &str, column: &str, default: T) -> RemoteResult<T> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| mismatch(table, column, v)),
    }
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

// =====================================================================
// user_progress
// =====================================================================

pub fn progress_to_row(user_id: &str, p: &Progress) -> Row {
    object(json!({
        "user_id": user_id,
        "total_games_played": p.games_played,
        "total_questions_answered": p.questions_answered,
        "total_correct_answers": p.correct_answers,
        "overall_accuracy": p.accuracy,
        "total_time_spent": p.time_spent,
        "best_streak": p.best_streak,
        "current_streak": p.current_streak,
        "level": p.level,
        "experience_points": p.xp,
        "last_played": p.last_played,
        "updated_at": p.updated_at,
    }))
}

pub fn progress_from_row(row: &Row) -> RemoteResult<Progress> {
    const T: &str = "user_progress";
    let mut p = Progress {
        games_played: u64_col(row, T, "total_games_played")?,
        questions_answered: u64_col(row, T, "total_questions_answered")?,
        correct_answers: u64_col(row, T, "total_correct_answers")?,
        time_spent: u64_col(row, T, "total_time_spent")?,
        best_streak: u64_col(row, T, "best_streak")?,
        level: u64_col(row, T, "level")?,
        xp: u64_col(row, T, "experience_points")?,
        current_streak: u64_col(row, T, "current_streak")?,
        last_played: opt_u64_col(row, T, "last_played")?,
        updated_at: u64_col(row, T, "updated_at")?,
        ..Default::default()
    };
    if p.correct_answers > p.questions_answered {
        return Err(RemoteError::SchemaMismatch(format!(
            "{T}: total_correct_answers {} exceeds total_questions_answered {}",
            p.correct_answers, p.questions_answered
        )));
    }
    p.recompute_accuracy();
    Ok(p)
}

// =====================================================================
// user_settings
// =====================================================================

/// Theme, language and unknown keys stay device-local.
pub fn settings_to_row(user_id: &str, s: &Preferences) -> Row {
    object(json!({
        "user_id": user_id,
        "sound_enabled": s.sound_enabled,
        "music_enabled": s.music_enabled,
        "vibration_enabled": s.vibration_enabled,
        "hints_enabled": s.hints_enabled,
        "age_group": s.age_group.as_str(),
        "text_size": s.text_size,
        "high_contrast": s.high_contrast,
        "reduced_motion": s.reduced_motion,
        "updated_at": s.updated_at,
    }))
}

/// Remote settings. Device-local fields keep their defaults; see `sync::merge::merge_settings`.
pub fn settings_from_row(row: &Row) -> RemoteResult<Preferences> {
    const T: &str = "user_settings";
    let d = Preferences::default();
    Ok(Preferences {
        sound_enabled: bool_col(row, T, "sound_enabled", d.sound_enabled)?,
        music_enabled: bool_col(row, T, "music_enabled", d.music_enabled)?,
        vibration_enabled: bool_col(row, T, "vibration_enabled", d.vibration_enabled)?,
        hints_enabled: bool_col(row, T, "hints_enabled", d.hints_enabled)?,
        age_group: enum_col::<AgeGroup>(row, T, "age_group", d.age_group)?,
        text_size: enum_col::<TextSize>(row, T, "text_size", d.text_size)?,
        high_contrast: bool_col(row, T, "high_contrast", d.high_contrast)?,
        reduced_motion: bool_col(row, T, "reduced_motion", d.reduced_motion)?,
        updated_at: u64_col(row, T, "updated_at")?,
        ..d
    })
}

// =====================================================================
// achievements
// =====================================================================

pub fn achievement_to_row(user_id: &str, a: &Achievement) -> Row {
    object(json!({
        "user_id": user_id,
        "achievement_id": a.id,
        "achievement_name": a.name,
        "unlocked_at": a.unlocked_at,
        "progress": a.progress,
    }))
}

pub fn achievement_from_row(row: &Row) -> RemoteResult<Achievement> {
    const T: &str = "achievements";
    let id = str_col(row, T, "achievement_id")?;
    if id.is_empty() {
        return Err(RemoteError::SchemaMismatch(format!("{T}: missing achievement_id")));
    }
    let progress = u64_col(row, T, "progress")?;
    if progress > 100 {
        return Err(RemoteError::SchemaMismatch(format!("{T}.progress: {progress} outside 0..=100")));
    }
    Ok(Achievement {
        id,
        name: str_col(row, T, "achievement_name")?,
        unlocked_at: opt_u64_col(row, T, "unlocked_at")?,
        progress: progress as u8,
        updated_at: 0,
    })
}

// =====================================================================
// game_sessions / user_profiles
// =====================================================================

pub fn session_to_row(user_id: &str, s: &SessionRecord) -> Row {
    object(json!({
        "id": s.id,
        "user_id": user_id,
        "game_type": s.game_type,
        "session_date": s.started_at,
        "questions_answered": s.questions_answered,
        "correct_answers": s.correct_answers,
        "accuracy": s.accuracy,
        "time_spent": s.time_spent,
        "longest_streak": s.longest_streak,
        "hints_used": s.hints_used,
        "score": s.score,
    }))
}

pub fn profile_to_row(profile: &UserProfile) -> Row {
    object(serde_json::to_value(profile).unwrap_or(Value::Null))
}

pub fn profile_from_row(row: &Row) -> RemoteResult<UserProfile> {
    Ok(codec::decode_value(Value::Object(row.clone()))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_row_uses_remote_column_names() {
        let p = Progress {
            games_played: 5,
            questions_answered: 40,
            correct_answers: 35,
            xp: 120,
            ..Default::default()
        };
        let row = progress_to_row("u1", &p);
        assert_eq!(row["total_games_played"], 5);
        assert_eq!(row["experience_points"], 120);

        let back = progress_from_row(&row).unwrap();
        assert_eq!(back.counters(), p.counters());
        assert_eq!(back.accuracy, 0.875);
    }

    #[test]
    fn wrong_column_type_is_schema_mismatch() {
        let mut row = progress_to_row("u1", &Progress::default());
        row.insert("best_streak".into(), json!("lots"));
        assert!(matches!(progress_from_row(&row), Err(RemoteError::SchemaMismatch(_))));
    }

    #[test]
    fn settings_row_accepts_legacy_age_group() {
        let mut remote = settings_to_row("u1", &Preferences::default());
        remote.insert("sound_enabled".into(), json!(false));
        remote.insert("age_group".into(), json!("6"));

        let prefs = settings_from_row(&remote).unwrap();
        assert!(!prefs.sound_enabled);
        assert_eq!(prefs.age_group, AgeGroup::SixToSeven);
    }

    #[test]
    fn achievement_progress_above_hundred_is_rejected() {
        let mut row = achievement_to_row("u1", &Achievement::new("a", "A"));
        row.insert("progress".into(), json!(140));
        assert!(achievement_from_row(&row).is_err());
    }
}
