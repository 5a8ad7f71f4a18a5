use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::ManualClock;
use crate::config::CoreConfig;
use crate::domain::{AgeGroup, UserIdentity};
use crate::error::{StatsError, StorageError, StorageResult};
use crate::persistence::{KvStore, LocalRepository, MemoryKvStore};
use crate::session::{CoreEvent, EventBus};
use crate::stats::{score, AchievementTracker, Attempt, PerformanceCache, StatisticsAggregator};

// =========================================================================
// Helpers
// =========================================================================

const T0: u64 = 1_700_000_000_000;

struct Fixture {
    stats: StatisticsAggregator,
    repo: LocalRepository,
    clock: Arc<ManualClock>,
    events: Arc<Mutex<Vec<CoreEvent>>>,
    guest: UserIdentity,
}

/// Memory store that refuses writes under one key prefix.
struct RejectingKv {
    inner: MemoryKvStore,
    prefix: &'static str,
}

impl KvStore for RejectingKv {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        if key.starts_with(self.prefix) {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key)
    }

    fn keys(&self, prefix: &str) -> StorageResult<BTreeSet<String>> {
        self.inner.keys(prefix)
    }
}

fn fixture() -> Fixture {
    fixture_on(Arc::new(MemoryKvStore::new()), CoreConfig::default())
}

fn fixture_on(kv: Arc<dyn KvStore>, config: CoreConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(T0));
    let repo = LocalRepository::new(kv, clock.clone());
    let bus = EventBus::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    bus.subscribe(move |e| {
        seen.lock().push(e.clone());
        Ok(())
    });
    let stats = StatisticsAggregator::new(repo.clone(), bus, config)
        .with_achievements(AchievementTracker::new());
    Fixture {
        stats,
        repo,
        clock,
        events,
        guest: UserIdentity::guest("g1", T0),
    }
}

impl Fixture {
    fn answer(&self, game: &str, ok: bool, ms: u64) {
        self.clock.advance(ms);
        self.stats.on_attempt(Attempt::new(game, ok, ms)).unwrap();
    }
}

// =========================================================================
// Sessions
// =========================================================================

#[test]
fn s1_guest_session_accumulates_into_progress() {
    let f = fixture();
    for (ok, ms) in [(true, 2000), (true, 1500), (false, 3000), (true, 1800), (true, 2200)] {
        f.answer("arithmetic", ok, ms);
    }

    let outcome = f.stats.end_session(&f.guest).unwrap();

    let progress = f.repo.load_progress(&f.guest);
    assert_eq!(progress.questions_answered, 5);
    assert_eq!(progress.correct_answers, 4);
    assert_eq!(progress.best_streak, 2);
    assert_eq!(progress.accuracy, 0.8);
    assert_eq!(progress.games_played, 1);

    let sessions = f.repo.list_sessions(&f.guest);
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].synced);
    assert_eq!(sessions[0], outcome.record);
    assert_eq!(outcome.record.longest_streak, 2);
    assert_eq!(outcome.record.score, 48);
}

#[test]
fn time_spent_runs_from_first_attempt_to_end() {
    let f = fixture();
    f.stats.start_session("time", 1, AgeGroup::default());
    f.answer("time", true, 4_000);
    f.clock.advance(1_000);

    let record = f.stats.end_session(&f.guest).unwrap().record;
    assert_eq!(record.started_at, T0);
    assert_eq!(record.time_spent, 5_000);
}

#[test]
fn progress_event_follows_the_saved_update() {
    let f = fixture();
    f.answer("shapes", true, 1_000);
    f.stats.end_session(&f.guest).unwrap();

    let events = f.events.lock();
    let Some(CoreEvent::ProgressUpdated { progress, session, .. }) = events.last() else {
        panic!("expected progressUpdated, got {:?}", events.last());
    };
    assert_eq!(progress, &f.repo.load_progress(&f.guest));
    assert_eq!(session.game_type, "shapes");
}

#[test]
fn second_session_adds_to_totals_and_xp() {
    let f = fixture();
    for _ in 0..3 {
        f.answer("money", true, 1_000);
    }
    f.stats.end_session(&f.guest).unwrap();
    f.answer("money", false, 1_000);
    let outcome = f.stats.end_session(&f.guest).unwrap();

    assert_eq!(outcome.progress.games_played, 2);
    assert_eq!(outcome.progress.questions_answered, 4);
    assert_eq!(outcome.progress.best_streak, 3);
    assert_eq!(outcome.progress.current_streak, 0);
    // 15 * 3 * 1.3
    assert_eq!(outcome.progress.xp, 59);
    assert_eq!(outcome.progress.level, 1);
    assert!(outcome.progress.updated_at > T0);
}

#[test]
fn other_game_attempt_is_rejected() {
    let f = fixture();
    f.answer("arithmetic", true, 1_000);

    let err = f
        .stats
        .on_attempt(Attempt::new("patterns", true, 1_000))
        .unwrap_err();
    assert!(matches!(err, StatsError::GameMismatch { .. }));
    assert!(f.stats.is_active());
}

#[test]
fn ending_without_session_fails() {
    let f = fixture();
    assert!(matches!(
        f.stats.end_session(&f.guest),
        Err(StatsError::NoActiveSession)
    ));
}

#[test]
fn failed_progress_write_keeps_the_session_open() {
    let f = fixture_on(
        Arc::new(RejectingKv {
            inner: MemoryKvStore::new(),
            prefix: "progress:",
        }),
        CoreConfig::default(),
    );
    f.answer("arithmetic", true, 1_000);
    f.answer("arithmetic", true, 1_000);

    assert!(matches!(
        f.stats.end_session(&f.guest),
        Err(StatsError::Storage(StorageError::Unavailable(_)))
    ));
    assert!(f.repo.list_sessions(&f.guest).is_empty());
    assert_eq!(f.repo.load_progress(&f.guest).games_played, 0);
    assert!(f.events.lock().is_empty());

    // the attempts are still there to record once storage recovers
    assert!(f.stats.is_active());
    f.answer("arithmetic", false, 1_000);
    assert!(f.stats.abandon_session());
}

#[test]
fn zero_xp_per_level_keeps_the_level() {
    let config = CoreConfig {
        xp_per_level: 0,
        ..CoreConfig::default()
    };
    let f = fixture_on(Arc::new(MemoryKvStore::new()), config);
    f.answer("arithmetic", true, 1_000);

    let outcome = f.stats.end_session(&f.guest).unwrap();
    assert!(outcome.progress.xp > 0);
    assert_eq!(outcome.progress.level, 0);
}

#[test]
fn abandoned_session_leaves_no_trace() {
    let f = fixture();
    f.answer("sequence", true, 1_000);
    assert!(f.stats.abandon_session());

    assert!(f.repo.list_sessions(&f.guest).is_empty());
    assert_eq!(f.repo.load_progress(&f.guest).games_played, 0);
}

#[test]
fn attempts_carry_the_adaptation_signal() {
    let f = fixture();
    let mut deltas = Vec::new();
    for _ in 0..6 {
        f.clock.advance(1_000);
        let signal = f
            .stats
            .on_attempt(Attempt::new("arithmetic", true, 1_000).with_difficulty(2))
            .unwrap();
        deltas.push(signal.delta);
    }
    assert_eq!(deltas, vec![0, 0, 0, 0, 1, 0]);
}

// =========================================================================
// Score, achievements, performance
// =========================================================================

#[test]
fn score_is_clamped_at_zero() {
    let config = CoreConfig::default();
    assert_eq!(score(&config, "arithmetic", 0, 0, 3), 0);
    assert_eq!(score(&config, "time", 2, 1, 1), 28);
    assert_eq!(score(&config, "unknown", 1, 0, 0), 10);
}

#[test]
fn perfect_first_session_unlocks_achievements() {
    let f = fixture();
    for _ in 0..5 {
        f.answer("arithmetic", true, 1_000);
    }
    let outcome = f.stats.end_session(&f.guest).unwrap();

    let ids: Vec<_> = outcome.unlocked.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["first_game", "streak_5", "perfect_session"]);
    assert!(outcome.unlocked.iter().all(|a| a.unlocked_at.is_some()));

    let stored = f.repo.list_achievements(&f.guest);
    assert_eq!(stored.len(), 5);

    f.answer("arithmetic", true, 1_000);
    assert!(f.stats.end_session(&f.guest).unwrap().unlocked.is_empty());
}

#[test]
fn performance_cache_tracks_each_game() {
    let f = fixture();
    f.answer("arithmetic", true, 2_000);
    f.answer("arithmetic", false, 4_000);
    f.stats.end_session(&f.guest).unwrap();

    let perf: PerformanceCache = f.repo.load_perf(&f.guest);
    let game = perf.game("arithmetic").unwrap();
    assert_eq!(game.sessions, 1);
    assert_eq!(game.avg_response_ms, 3_000);
    assert_eq!(game.accuracy, 0.5);
}
