//! Typed, namespaced access to everything the core persists.
//!
//! Every storage key in the crate is built here. Identity-scoped entities
//! live under `<prefix>:<identityKey>`; guest and user namespaces never
//! share a key.
//!
//! Reads never fail: a missing backend yields empty state and a value that
//! fails to decode is moved to `corrupt:<key>` and treated as absent.
//! Writes return a typed `StorageError`.

use std::sync::Arc;

use crate::clock::{stamp_after, Clock};
use crate::domain::{
    Achievement, DeadLetter, PendingAction, PersistedSession, Preferences, Progress, SessionRecord,
    UserIdentity,
};
use crate::error::{StorageError, StorageResult};
use crate::persistence::codec::{self, Schema};
use crate::persistence::kv::KvStore;
use crate::persistence::meta::SyncMeta;

const KEY_GUEST_ID: &str = "guest_id";
const KEY_SESSION: &str = "session";
const KEY_PENDING: &str = "pending_queue";
const KEY_DEAD_LETTER: &str = "pending_dead_letter";
const CORRUPT_PREFIX: &str = "corrupt";

const PREFIX_PROGRESS: &str = "progress";
const PREFIX_SETTINGS: &str = "settings";
const PREFIX_ACHIEVEMENTS: &str = "achievements";
const PREFIX_SESSIONS: &str = "sessions";
const PREFIX_PERF: &str = "perf";
const PREFIX_SYNC_META: &str = "sync_meta";

const NAMESPACED_PREFIXES: [&str; 6] = [
    PREFIX_PROGRESS,
    PREFIX_SETTINGS,
    PREFIX_ACHIEVEMENTS,
    PREFIX_SESSIONS,
    PREFIX_PERF,
    PREFIX_SYNC_META,
];

fn ns_key(prefix: &str, identity: &UserIdentity) -> String {
    format!("{prefix}:{}", identity.identity_key())
}

#[derive(Clone)]
pub struct LocalRepository {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    max_pending: usize,
    max_dead_letters: usize,
}

impl LocalRepository {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            max_pending: 1_000,
            max_dead_letters: 100,
        }
    }

    pub fn with_limits(mut self, max_pending: usize, max_dead_letters: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self.max_dead_letters = max_dead_letters.max(1);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ================================
    // Raw typed IO
    // ================================

    fn read<T: Schema>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[REPO] read `{}` degraded to empty: {}", key, e);
                return None;
            }
        };

        match codec::decode::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.quarantine(key, &raw, &e.to_string());
                None
            }
        }
    }

    fn write<T: Schema>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = codec::encode(value)?;
        log::trace!("[REPO] put {} = {}", key, raw);
        self.kv.put(key, &raw)
    }

    fn quarantine(&self, key: &str, raw: &str, reason: &str) {
        let corrupt_key = format!("{CORRUPT_PREFIX}:{key}");
        log::warn!("[REPO] `{}` failed to decode ({}), quarantined to `{}`", key, reason, corrupt_key);
        if let Err(e) = self.kv.put(&corrupt_key, raw).and_then(|_| self.kv.delete(key)) {
            log::warn!("[REPO] quarantine of `{}` failed: {}", key, e);
        }
    }

    // ================================
    // Progress
    // ================================

    /// Stored progress, or zeros.
    pub fn load_progress(&self, identity: &UserIdentity) -> Progress {
        let mut progress: Progress = self.read(&ns_key(PREFIX_PROGRESS, identity)).unwrap_or_default();
        progress.recompute_accuracy();
        progress
    }

    /// Saves progress without ever lowering a monotonic counter: decreases
    /// are clamped to the stored value. Returns what was stored.
    pub fn save_progress(&self, identity: &UserIdentity, progress: &Progress) -> StorageResult<Progress> {
        progress
            .validate()
            .map_err(StorageError::Rejected)?;

        let key = ns_key(PREFIX_PROGRESS, identity);
        let previous: Progress = self.read(&key).unwrap_or_default();

        let mut next = progress.clone();
        if next.raise_to(&previous) {
            log::warn!(
                "[REPO] clamped decreasing progress counters for {}",
                identity.identity_key()
            );
        }
        next.normalize();

        self.write(&key, &next)?;
        Ok(next)
    }

    // ================================
    // Settings
    // ================================

    pub fn load_settings(&self, identity: &UserIdentity) -> Preferences {
        self.read(&ns_key(PREFIX_SETTINGS, identity)).unwrap_or_default()
    }

    pub fn has_settings(&self, identity: &UserIdentity) -> bool {
        matches!(self.kv.get(&ns_key(PREFIX_SETTINGS, identity)), Ok(Some(_)))
    }

    /// Saves a local edit. When any field other than `updated_at` differs from
    /// the stored value, `updated_at` is moved past the stored stamp so the
    /// next push picks the edit up. Returns what was stored.
    pub fn save_settings(&self, identity: &UserIdentity, settings: &Preferences) -> StorageResult<Preferences> {
        let key = ns_key(PREFIX_SETTINGS, identity);
        let previous: Preferences = self.read(&key).unwrap_or_default();

        let mut next = settings.clone();
        let edited = Preferences {
            updated_at: previous.updated_at,
            ..settings.clone()
        } != previous;
        if edited {
            next.updated_at = stamp_after(self.clock.now(), previous.updated_at).max(settings.updated_at);
        }

        self.write(&key, &next)?;
        Ok(next)
    }

    /// Stores settings exactly as given. Used by sync merges, whose stamps
    /// come from the remote side and must not be moved.
    pub(crate) fn replace_settings(&self, identity: &UserIdentity, settings: &Preferences) -> StorageResult<()> {
        self.write(&ns_key(PREFIX_SETTINGS, identity), settings)
    }

    // ================================
    // Achievements
    // ================================

    pub fn list_achievements(&self, identity: &UserIdentity) -> Vec<Achievement> {
        self.read(&ns_key(PREFIX_ACHIEVEMENTS, identity)).unwrap_or_default()
    }

    /// Inserts or updates one achievement. Lowering `progress` or clearing
    /// `unlocked_at` is rejected. Reaching 100 stamps `unlocked_at` with now;
    /// an existing `unlocked_at` only ever moves earlier.
    pub fn upsert_achievement(&self, identity: &UserIdentity, incoming: Achievement) -> StorageResult<Achievement> {
        incoming
            .validate()
            .map_err(StorageError::Rejected)?;

        let mut all = self.list_achievements(identity);
        let now = self.clock.now();

        let position = all.iter().position(|a| a.id == incoming.id);
        let mut next = incoming;

        if let Some(i) = position {
            let existing = &all[i];
            if next.progress < existing.progress {
                return Err(StorageError::Rejected(format!(
                    "achievement `{}` progress would drop from {} to {}",
                    existing.id, existing.progress, next.progress
                )));
            }
            if existing.unlocked_at.is_some() && next.unlocked_at.is_none() {
                return Err(StorageError::Rejected(format!(
                    "achievement `{}` unlockedAt cannot be cleared",
                    existing.id
                )));
            }
            next.unlocked_at = match (existing.unlocked_at, next.unlocked_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        if next.progress == 100 && next.unlocked_at.is_none() {
            next.unlocked_at = Some(now);
        }

        if let Some(i) = position {
            let existing = &all[i];
            if existing.progress == next.progress
                && existing.unlocked_at == next.unlocked_at
                && existing.name == next.name
            {
                return Ok(existing.clone());
            }
        }

        let previous_stamp = position.map(|i| all[i].updated_at).unwrap_or(0);
        next.updated_at = stamp_after(now, previous_stamp).max(next.updated_at);
        match position {
            Some(i) => all[i] = next.clone(),
            None => all.push(next.clone()),
        }
        self.write(&ns_key(PREFIX_ACHIEVEMENTS, identity), &all)?;
        Ok(next)
    }

    /// Replaces the whole list. Used by sync merges, which already applied the rules.
    pub(crate) fn replace_achievements(&self, identity: &UserIdentity, all: Vec<Achievement>) -> StorageResult<()> {
        self.write(&ns_key(PREFIX_ACHIEVEMENTS, identity), &all)
    }

    // ================================
    // Session records
    // ================================

    pub fn list_sessions(&self, identity: &UserIdentity) -> Vec<SessionRecord> {
        self.read(&ns_key(PREFIX_SESSIONS, identity)).unwrap_or_default()
    }

    pub fn list_unsynced_sessions(&self, identity: &UserIdentity) -> Vec<SessionRecord> {
        self.list_sessions(identity)
            .into_iter()
            .filter(|s| !s.synced)
            .collect()
    }

    pub fn append_session(&self, identity: &UserIdentity, record: &SessionRecord) -> StorageResult<()> {
        record
            .validate()
            .map_err(StorageError::Rejected)?;

        let mut all = self.list_sessions(identity);
        if all.iter().any(|s| s.id == record.id) {
            return Err(StorageError::Rejected(format!("session `{}` already recorded", record.id)));
        }
        all.push(record.clone());
        self.write(&ns_key(PREFIX_SESSIONS, identity), &all)
    }

    /// Drops a record again. Only used to undo an append whose follow-up
    /// writes failed.
    pub(crate) fn remove_session(&self, identity: &UserIdentity, id: &str) -> StorageResult<bool> {
        let mut all = self.list_sessions(identity);
        let before = all.len();
        all.retain(|s| s.id != id);
        if all.len() == before {
            return Ok(false);
        }
        self.write(&ns_key(PREFIX_SESSIONS, identity), &all)?;
        Ok(true)
    }

    /// Flips `synced` to true. Returns `false` if the id is unknown.
    pub fn mark_session_synced(&self, identity: &UserIdentity, id: &str) -> StorageResult<bool> {
        self.mark_sessions_synced(identity, &[id]).map(|n| n > 0)
    }

    pub fn mark_sessions_synced(&self, identity: &UserIdentity, ids: &[&str]) -> StorageResult<usize> {
        let mut all = self.list_sessions(identity);
        let mut changed = 0;
        for record in all.iter_mut().filter(|s| !s.synced && ids.contains(&s.id.as_str())) {
            record.synced = true;
            changed += 1;
        }
        if changed > 0 {
            self.write(&ns_key(PREFIX_SESSIONS, identity), &all)?;
        }
        Ok(changed)
    }

    // ================================
    // Pending queue
    // ================================

    pub fn list_pending(&self) -> Vec<PendingAction> {
        self.read(KEY_PENDING).unwrap_or_default()
    }

    /// Appends to the tail. When the queue is full the oldest action is
    /// evicted and returned.
    pub fn push_pending(&self, action: PendingAction) -> StorageResult<Option<PendingAction>> {
        let mut queue = self.list_pending();
        queue.push(action);
        let evicted = if queue.len() > self.max_pending {
            let oldest = queue.remove(0);
            log::warn!("[QUEUE] queue full ({}), evicted oldest action {}", self.max_pending, oldest.id);
            Some(oldest)
        } else {
            None
        };
        self.write(KEY_PENDING, &queue)?;
        Ok(evicted)
    }

    pub fn peek_pending(&self) -> Option<PendingAction> {
        self.list_pending().into_iter().next()
    }

    pub fn pop_pending(&self) -> StorageResult<Option<PendingAction>> {
        let mut queue = self.list_pending();
        if queue.is_empty() {
            return Ok(None);
        }
        let head = queue.remove(0);
        self.write(KEY_PENDING, &queue)?;
        Ok(Some(head))
    }

    pub fn size_pending(&self) -> usize {
        self.list_pending().len()
    }

    /// Rewrites a queued action in place (attempt counters, last error).
    pub fn replace_pending(&self, action: &PendingAction) -> StorageResult<()> {
        let mut queue = self.list_pending();
        let slot = queue
            .iter_mut()
            .find(|a| a.id == action.id)
            .ok_or_else(|| StorageError::Invariant(format!("action {} is not queued", action.id)))?;
        *slot = action.clone();
        self.write(KEY_PENDING, &queue)
    }

    /// Removes one action wherever it sits. Returns `false` if it was not queued.
    pub fn remove_pending(&self, id: &str) -> StorageResult<bool> {
        let mut queue = self.list_pending();
        let before = queue.len();
        queue.retain(|a| a.id != id);
        if queue.len() == before {
            return Ok(false);
        }
        self.write(KEY_PENDING, &queue)?;
        Ok(true)
    }

    /// Moves a queued action out of the active queue into the dead-letter set.
    pub fn dead_letter(&self, action: &PendingAction, reason: &str) -> StorageResult<()> {
        if !self.list_pending().iter().any(|a| a.id == action.id) {
            return Err(StorageError::Invariant(format!("action {} is not queued", action.id)));
        }
        self.push_dead_letter(action, reason)?;
        self.remove_pending(&action.id).map(|_| ())
    }

    pub fn push_dead_letter(&self, action: &PendingAction, reason: &str) -> StorageResult<()> {
        let mut letters = self.dead_letters();
        letters.push(DeadLetter {
            action: action.clone(),
            poisoned_at: self.clock.now(),
            reason: reason.to_string(),
        });
        if letters.len() > self.max_dead_letters {
            let overflow = letters.len() - self.max_dead_letters;
            letters.drain(..overflow);
        }
        log::warn!("[QUEUE] poisoned action {} ({}): {}", action.id, action.collection, reason);
        self.write(KEY_DEAD_LETTER, &letters)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.read(KEY_DEAD_LETTER).unwrap_or_default()
    }

    // ================================
    // Guest id / session
    // ================================

    /// Stable per device. If storage is unavailable an ephemeral id is returned.
    pub fn get_or_create_guest_id(&self) -> String {
        if let Some(id) = self.read::<String>(KEY_GUEST_ID) {
            return id;
        }
        self.rotate_guest_id()
    }

    /// Mints and persists a fresh guest id.
    pub fn rotate_guest_id(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self.write(KEY_GUEST_ID, &id) {
            log::warn!("[REPO] could not persist guest id, using ephemeral {}: {}", id, e);
        } else {
            log::info!("[REPO] minted guest id {}", id);
        }
        id
    }

    pub fn load_session(&self) -> Option<PersistedSession> {
        self.read(KEY_SESSION)
    }

    pub fn save_session(&self, session: &PersistedSession) -> StorageResult<()> {
        self.write(KEY_SESSION, session)
    }

    pub fn delete_session(&self) -> StorageResult<()> {
        self.kv.delete(KEY_SESSION)
    }

    // ================================
    // Perf cache / sync meta
    // ================================

    pub fn load_perf<T: Schema + Default>(&self, identity: &UserIdentity) -> T {
        self.read(&ns_key(PREFIX_PERF, identity)).unwrap_or_default()
    }

    pub fn save_perf<T: Schema>(&self, identity: &UserIdentity, perf: &T) -> StorageResult<()> {
        self.write(&ns_key(PREFIX_PERF, identity), perf)
    }

    pub fn load_sync_meta(&self, identity: &UserIdentity) -> SyncMeta {
        self.read(&ns_key(PREFIX_SYNC_META, identity)).unwrap_or_default()
    }

    pub fn save_sync_meta(&self, identity: &UserIdentity, meta: &SyncMeta) -> StorageResult<()> {
        self.write(&ns_key(PREFIX_SYNC_META, identity), meta)
    }

    /// Deletes every identity-scoped key of `identity`.
    pub fn clear_namespace(&self, identity: &UserIdentity) -> StorageResult<()> {
        for prefix in NAMESPACED_PREFIXES {
            self.kv.delete(&ns_key(prefix, identity))?;
        }
        log::info!("[REPO] cleared namespace {}", identity.identity_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{AgeGroup, PendingAction};
    use crate::persistence::kv::MemoryKvStore;
    use serde_json::json;

    fn repo() -> (LocalRepository, Arc<MemoryKvStore>, Arc<ManualClock>) {
        let kv = Arc::new(MemoryKvStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        (LocalRepository::new(kv.clone(), clock.clone()), kv, clock)
    }

    fn guest() -> UserIdentity {
        UserIdentity::guest("g1", 0)
    }

    fn record(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            game_type: "arithmetic".into(),
            started_at: 0,
            ended_at: 10,
            questions_answered: 2,
            correct_answers: 1,
            accuracy: 0.5,
            time_spent: 10,
            longest_streak: 1,
            hints_used: 0,
            score: 11,
            difficulty: 1,
            age_group: AgeGroup::FourToFive,
            synced: false,
        }
    }

    fn action(n: u64) -> PendingAction {
        let row = json!({"n": n}).as_object().cloned().unwrap();
        PendingAction::insert_many("game_sessions", vec![row], n)
    }

    #[test]
    fn missing_progress_loads_as_zeros() {
        let (repo, _, _) = repo();
        let p = repo.load_progress(&guest());
        assert_eq!(p.counters(), [0; 7]);
        assert_eq!(p.accuracy, 0.0);
    }

    #[test]
    fn save_progress_never_lowers_counters() {
        let (repo, _, _) = repo();
        let id = guest();
        let first = Progress {
            games_played: 4,
            questions_answered: 40,
            correct_answers: 30,
            best_streak: 6,
            ..Default::default()
        };
        repo.save_progress(&id, &first).unwrap();

        let lower = Progress {
            games_played: 2,
            questions_answered: 50,
            correct_answers: 10,
            current_streak: 9,
            ..Default::default()
        };
        let stored = repo.save_progress(&id, &lower).unwrap();
        assert_eq!(stored.games_played, 4);
        assert_eq!(stored.questions_answered, 50);
        assert_eq!(stored.correct_answers, 30);
        assert_eq!(stored.best_streak, 9, "best streak covers the current streak");
        assert_eq!(repo.load_progress(&id).accuracy, 30.0 / 50.0);
    }

    #[test]
    fn save_progress_rejects_impossible_accuracy() {
        let (repo, _, _) = repo();
        let bad = Progress {
            questions_answered: 1,
            correct_answers: 2,
            ..Default::default()
        };
        assert!(matches!(repo.save_progress(&guest(), &bad), Err(StorageError::Rejected(_))));
    }

    #[test]
    fn corrupt_value_is_quarantined() {
        let (repo, kv, _) = repo();
        kv.put("progress:guest:g1", "{\"gamesPlayed\": \"many\"}").unwrap();

        let p = repo.load_progress(&guest());
        assert_eq!(p.games_played, 0);
        assert!(kv.get("progress:guest:g1").unwrap().is_none());
        assert!(kv.get("corrupt:progress:guest:g1").unwrap().is_some());
    }

    #[test]
    fn reads_degrade_and_writes_fail_when_unavailable() {
        let (repo, kv, _) = repo();
        kv.set_available(false);
        assert_eq!(repo.load_progress(&guest()).games_played, 0);
        assert!(repo.list_achievements(&guest()).is_empty());
        assert!(matches!(
            repo.save_settings(&guest(), &Preferences::default()),
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn settings_edit_moves_the_stamp() {
        let (repo, _, clock) = repo();
        let id = guest();

        let stored = repo.save_settings(&id, &Preferences::default()).unwrap();
        assert_eq!(stored.updated_at, 0);

        clock.set(5_000);
        let edited = repo
            .save_settings(
                &id,
                &Preferences {
                    sound_enabled: false,
                    ..stored.clone()
                },
            )
            .unwrap();
        assert_eq!(edited.updated_at, 5_000);
        assert_eq!(repo.load_settings(&id), edited);

        // saving the same values again leaves the stamp alone
        clock.set(9_000);
        assert_eq!(repo.save_settings(&id, &edited).unwrap().updated_at, 5_000);
    }

    #[test]
    fn achievement_unlock_is_sticky() {
        let (repo, _, clock) = repo();
        let id = guest();

        repo.upsert_achievement(&id, Achievement::new("streak5", "Streak 5").with_progress(60))
            .unwrap();
        clock.set(5_000);
        let unlocked = repo
            .upsert_achievement(&id, Achievement::new("streak5", "Streak 5").with_progress(100))
            .unwrap();
        assert_eq!(unlocked.unlocked_at, Some(5_000));

        let lower = repo.upsert_achievement(&id, Achievement::new("streak5", "Streak 5").with_progress(80));
        assert!(matches!(lower, Err(StorageError::Rejected(_))));

        let cleared = repo.upsert_achievement(&id, Achievement::new("streak5", "Streak 5").with_progress(100));
        assert!(matches!(cleared, Err(StorageError::Rejected(_))));

        let mut later = Achievement::new("streak5", "Streak 5").with_progress(100);
        later.unlocked_at = Some(9_000);
        let kept = repo.upsert_achievement(&id, later).unwrap();
        assert_eq!(kept.unlocked_at, Some(5_000));
    }

    #[test]
    fn sessions_append_and_mark_synced() {
        let (repo, _, _) = repo();
        let id = guest();
        repo.append_session(&id, &record("s1")).unwrap();
        repo.append_session(&id, &record("s2")).unwrap();
        assert!(repo.append_session(&id, &record("s1")).is_err());

        assert!(repo.mark_session_synced(&id, "s1").unwrap());
        assert!(!repo.mark_session_synced(&id, "missing").unwrap());

        let unsynced: Vec<_> = repo.list_unsynced_sessions(&id).into_iter().map(|s| s.id).collect();
        assert_eq!(unsynced, vec!["s2".to_string()]);
    }

    #[test]
    fn queue_is_fifo_and_bounded() {
        let (repo, _, _) = repo();
        let repo = repo.with_limits(3, 10);

        for n in 0..3 {
            assert!(repo.push_pending(action(n)).unwrap().is_none());
        }
        let evicted = repo.push_pending(action(3)).unwrap().unwrap();
        assert_eq!(evicted.created_at, 0);
        assert_eq!(repo.size_pending(), 3);

        let order: Vec<u64> = std::iter::from_fn(|| repo.pop_pending().unwrap())
            .map(|a| a.created_at)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn queue_order_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        {
            let kv = Arc::new(crate::persistence::kv::FileKvStore::open(&path).unwrap());
            let repo = LocalRepository::new(kv, clock.clone());
            for n in 0..5 {
                repo.push_pending(action(n)).unwrap();
            }
        }
        let kv = Arc::new(crate::persistence::kv::FileKvStore::open(&path).unwrap());
        let repo = LocalRepository::new(kv, clock);
        let order: Vec<u64> = repo.list_pending().into_iter().map(|a| a.created_at).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn dead_letter_moves_action_out() {
        let (repo, _, _) = repo();
        let head = action(1);
        repo.push_pending(head.clone()).unwrap();
        repo.push_pending(action(2)).unwrap();

        repo.dead_letter(&head, "SchemaMismatch").unwrap();
        assert_eq!(repo.size_pending(), 1);
        assert_eq!(repo.dead_letters()[0].action.id, head.id);

        assert!(repo.dead_letter(&head, "again").is_err());
    }

    #[test]
    fn guest_id_is_stable() {
        let (repo, _, _) = repo();
        let a = repo.get_or_create_guest_id();
        let b = repo.get_or_create_guest_id();
        assert_eq!(a, b);
        assert_ne!(repo.rotate_guest_id(), a);
    }

    #[test]
    fn clear_namespace_leaves_other_identities() {
        let (repo, kv, _) = repo();
        let g = guest();
        let other = UserIdentity::guest("g2", 0);
        let p = Progress {
            games_played: 1,
            ..Default::default()
        };
        repo.save_progress(&g, &p).unwrap();
        repo.save_progress(&other, &p).unwrap();

        repo.clear_namespace(&g).unwrap();
        assert!(kv.get("progress:guest:g1").unwrap().is_none());
        assert_eq!(repo.load_progress(&other).games_played, 1);
    }
}
