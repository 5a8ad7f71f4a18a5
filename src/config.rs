//! Core configuration.
//!
//! All options are optional in the JSON form; missing keys take the
//! defaults below. Keys are camelCase (`autoSyncIntervalMs`, ...).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub auto_sync_interval_ms: u64,
    /// Fraction of the interval applied as +/- jitter to each auto-sync period.
    pub auto_sync_jitter: f64,
    pub max_pending_actions: usize,
    pub max_dead_letters: usize,
    pub max_replay_attempts: u32,
    pub session_guest_ttl_days: u64,
    pub remote_deadline_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,

    pub adapt_window: usize,
    pub adapt_cooldown: u32,
    pub adapt_high_accuracy: f64,
    pub adapt_low_accuracy: f64,
    /// Average response time (ms) at or below which a difficulty counts as "fast".
    pub adapt_fast_threshold_ms: BTreeMap<u8, u64>,
    pub min_difficulty: u8,
    pub max_difficulty: u8,

    pub score_base: BTreeMap<String, f64>,
    pub default_score_base: f64,
    pub streak_bonus: f64,
    pub hint_penalty: f64,
    pub xp_per_level: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let score_base = [
            ("arithmetic", 10.0),
            ("time", 15.0),
            ("sequence", 10.0),
            ("money", 15.0),
            ("patterns", 10.0),
            ("shapes", 10.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let adapt_fast_threshold_ms = [(1, 5_000), (2, 4_000), (3, 3_000), (4, 2_500), (5, 2_000)]
            .into_iter()
            .collect();

        Self {
            auto_sync_interval_ms: 300_000,
            auto_sync_jitter: 0.1,
            max_pending_actions: 1_000,
            max_dead_letters: 100,
            max_replay_attempts: 10,
            session_guest_ttl_days: 30,
            remote_deadline_ms: 15_000,
            backoff_initial_ms: 30_000,
            backoff_max_ms: 600_000,
            adapt_window: 5,
            adapt_cooldown: 10,
            adapt_high_accuracy: 0.85,
            adapt_low_accuracy: 0.40,
            adapt_fast_threshold_ms,
            min_difficulty: 1,
            max_difficulty: 5,
            score_base,
            default_score_base: 10.0,
            streak_bonus: 0.1,
            hint_penalty: 5.0,
            xp_per_level: 500,
        }
    }
}

impl CoreConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json).context("parsing core config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("loading config from {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.auto_sync_interval_ms > 0, "autoSyncIntervalMs must be > 0");
        anyhow::ensure!(
            (0.0..=0.5).contains(&self.auto_sync_jitter),
            "autoSyncJitter must be within [0, 0.5]"
        );
        anyhow::ensure!(self.max_pending_actions > 0, "maxPendingActions must be > 0");
        anyhow::ensure!(self.remote_deadline_ms > 0, "remoteDeadlineMs must be > 0");
        anyhow::ensure!(
            self.backoff_initial_ms > 0 && self.backoff_initial_ms <= self.backoff_max_ms,
            "backoffInitialMs must be > 0 and <= backoffMaxMs"
        );
        anyhow::ensure!(self.adapt_window > 0, "adaptWindow must be > 0");
        anyhow::ensure!(
            self.adapt_low_accuracy < self.adapt_high_accuracy,
            "adaptLowAccuracy must be below adaptHighAccuracy"
        );
        anyhow::ensure!(
            self.min_difficulty <= self.max_difficulty,
            "minDifficulty must be <= maxDifficulty"
        );
        anyhow::ensure!(self.xp_per_level > 0, "xpPerLevel must be > 0");
        Ok(())
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }

    pub fn remote_deadline(&self) -> Duration {
        Duration::from_millis(self.remote_deadline_ms)
    }

    pub fn guest_ttl_ms(&self) -> u64 {
        self.session_guest_ttl_days * crate::clock::MS_PER_DAY
    }

    pub fn score_base_for(&self, game_type: &str) -> f64 {
        self.score_base
            .get(game_type)
            .copied()
            .unwrap_or(self.default_score_base)
    }

    /// Fast threshold for a difficulty; falls back to the nearest lower configured level.
    pub fn fast_threshold_ms(&self, difficulty: u8) -> u64 {
        self.adapt_fast_threshold_ms
            .range(..=difficulty)
            .next_back()
            .or_else(|| self.adapt_fast_threshold_ms.iter().next())
            .map(|(_, ms)| *ms)
            .unwrap_or(3_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = CoreConfig::from_json(r#"{"autoSyncIntervalMs": 60000}"#).unwrap();
        assert_eq!(config.auto_sync_interval_ms, 60_000);
        assert_eq!(config.max_pending_actions, 1_000);
        assert_eq!(config.session_guest_ttl_days, 30);
        assert_eq!(config.score_base_for("arithmetic"), 10.0);
    }

    #[test]
    fn rejects_inverted_backoff() {
        let err = CoreConfig::from_json(r#"{"backoffInitialMs": 10, "backoffMaxMs": 5}"#);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_game_uses_default_base() {
        let config = CoreConfig::default();
        assert_eq!(config.score_base_for("puzzles"), config.default_score_base);
    }

    #[test]
    fn fast_threshold_falls_back_to_lower_level() {
        let config = CoreConfig::default();
        assert_eq!(config.fast_threshold_ms(2), 4_000);
        assert_eq!(config.fast_threshold_ms(9), 2_000);
        assert_eq!(config.fast_threshold_ms(0), 5_000);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        std::fs::write(&path, r#"{"remoteDeadlineMs": 2000}"#).unwrap();
        let config = CoreConfig::from_path(&path).unwrap();
        assert_eq!(config.remote_deadline(), Duration::from_millis(2_000));
    }
}
