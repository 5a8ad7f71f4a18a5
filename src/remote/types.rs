use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote row: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Equality filter on columns. All pairs must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(pub BTreeMap<String, Value>);

impl Selector {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|(col, want)| row.get(col) == Some(want))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    /// ms since epoch.
    pub expires_at: u64,
    /// Free-form sign-up metadata (display name, age group).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Pushed on the adapter's auth channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

/// Remote collection names.
pub mod tables {
    pub const USER_PROFILES: &str = "user_profiles";
    pub const USER_PROGRESS: &str = "user_progress";
    pub const USER_SETTINGS: &str = "user_settings";
    pub const ACHIEVEMENTS: &str = "achievements";
    pub const GAME_SESSIONS: &str = "game_sessions";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_matches_every_column() {
        let row = json!({"user_id": "u1", "achievement_id": "a1", "progress": 40})
            .as_object()
            .cloned()
            .unwrap();
        assert!(Selector::new().eq("user_id", "u1").matches(&row));
        assert!(Selector::new().eq("user_id", "u1").eq("achievement_id", "a1").matches(&row));
        assert!(!Selector::new().eq("user_id", "u2").matches(&row));
        assert!(Selector::new().matches(&row));
    }
}
