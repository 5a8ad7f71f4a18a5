use std::collections::HashSet;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use serde_json::Value;

use crate::clock::stamp_after;
use crate::domain::{PendingAction, PendingOp, UserIdentity};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::persistence::SyncMeta;
use crate::remote::{rows, tables, Row, Selector};
use crate::session::events::CoreEvent;
use crate::sync::engine::{SyncCommand, SyncEvent, SyncState};
use crate::sync::merge::{merge_achievements, merge_progress, merge_settings, same_achievement};

use super::{SharedSync, SyncEngine, SyncReport};

impl SyncEngine {
    // =====================================================================
    // Machine plumbing
    // =====================================================================

    /// Feeds an event into the machine and executes the synchronous
    /// commands. `RunSync` / `DrainQueue` are returned for the caller.
    pub(super) fn process_machine(&self, event: SyncEvent) -> Vec<SyncCommand> {
        let cmds = self.inner.machine.lock().handle_event(event);

        let mut deferred = Vec::new();
        for cmd in cmds {
            match cmd {
                SyncCommand::Publish { state, last_error } => {
                    self.inner.bus.emit(CoreEvent::SyncStateChanged { state, last_error });
                }
                SyncCommand::StopAutoSync => self.stop_auto_sync(),
                other => deferred.push(other),
            }
        }
        deferred
    }

    /// Makes `identity` the one sync works for. Cancels auto-sync and any
    /// replay still running for the previous identity.
    pub fn switch_identity(&self, identity: &UserIdentity) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_auto_sync();
        *self.inner.active.lock() = Some(identity.clone());
        log::info!(
            "[SYNC] active identity {} (generation {})",
            identity.identity_key(),
            generation
        );

        let event = if identity.is_guest() {
            SyncEvent::SignedOut
        } else {
            SyncEvent::SignedIn
        };
        self.process_machine(event);
    }

    /// Connectivity change. Coming back online replays the queue.
    pub async fn set_online(&self, online: bool) {
        let event = if online { SyncEvent::WentOnline } else { SyncEvent::WentOffline };
        let cmds = self.process_machine(event);
        if cmds.contains(&SyncCommand::DrainQueue) {
            match self.drain_queue().await {
                Ok(report) => log::info!("[QUEUE] replay after reconnect: {:?}", report),
                Err(e) => log::warn!("[QUEUE] replay after reconnect stopped: {}", e),
            }
        }
    }

    pub(super) fn signal_auth_lost(&self) {
        if let Some(identity) = self.active_identity() {
            log::warn!("[SYNC] remote rejected session of {}", identity.identity_key());
            // nobody listening is fine
            let _ = self.inner.auth_lost.send(identity);
        }
    }

    /// Feeds a run's outcome back into the machine, unless the identity
    /// changed while it ran.
    pub(super) fn finish(&self, generation: u64, result: &SyncResult<SyncReport>) {
        if self.ensure_current(generation).is_err() {
            log::debug!("[SYNC] outcome of a stale run dropped");
            return;
        }
        match result {
            Ok(_) => {
                self.process_machine(SyncEvent::SyncSucceeded);
            }
            Err(SyncError::Remote(error)) => {
                self.process_machine(SyncEvent::SyncFailed {
                    now: self.now(),
                    error: error.clone(),
                });
                if *error == RemoteError::NotAuthenticated {
                    self.signal_auth_lost();
                }
            }
            Err(SyncError::Cancelled) => {}
            Err(other) => {
                self.process_machine(SyncEvent::SyncAborted {
                    reason: other.to_string(),
                });
            }
        }
    }

    // =====================================================================
    // sync_all (single-flight)
    // =====================================================================

    /// Push then pull. Concurrent calls for the same identity share one run.
    /// When offline, dirty entities are only queued and the report says so.
    ///
    /// # Arguments
    /// * `identity` - Authenticated identity to sync; a guest yields
    ///   `SyncError::Disabled`.
    pub async fn sync_all(&self, identity: &UserIdentity) -> SyncResult<SyncReport> {
        let flight = {
            let key = identity.identity_key();
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(running) => {
                    log::debug!("[SYNC] joining in-flight sync for {}", key);
                    running.clone()
                }
                None => {
                    let flight = self.flight(identity.clone(), false);
                    in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Builds the shared future for one run. `started` means the machine
    /// already moved to `Syncing` (timer path).
    pub(super) fn flight(&self, identity: UserIdentity, started: bool) -> SharedSync {
        let this = self.clone();
        async move {
            let result = this.run_sync(&identity, started).await;
            this.inner.in_flight.lock().remove(&identity.identity_key());
            result
        }
        .boxed()
        .shared()
    }

    async fn run_sync(&self, identity: &UserIdentity, started: bool) -> SyncResult<SyncReport> {
        let user_id = identity.user_id().ok_or(SyncError::Disabled)?;
        let generation = self.generation();

        if !started {
            let cmds = self.process_machine(SyncEvent::SyncRequested { now: self.now() });
            if !cmds.contains(&SyncCommand::RunSync) {
                return match self.state() {
                    SyncState::Offline => self.queue_offline(identity, user_id),
                    SyncState::Disabled => Err(SyncError::Disabled),
                    other => Err(SyncError::Invariant(format!("sync requested while {other}"))),
                };
            }
        }

        log::info!("[SYNC] sync_all start for {}", identity.identity_key());
        let result = self.push_and_pull(identity, user_id, generation).await;
        match &result {
            Ok(report) => log::info!("[SYNC] sync_all done for {}: {:?}", identity.identity_key(), report),
            Err(e) => log::warn!("[SYNC] sync_all failed for {}: {}", identity.identity_key(), e),
        }
        self.finish(generation, &result);
        result
    }

    async fn push_and_pull(&self, identity: &UserIdentity, user_id: &str, generation: u64) -> SyncResult<SyncReport> {
        let mut report = self.push_inner(identity, user_id, generation).await?;
        self.ensure_current(generation)?;
        self.pull_inner(identity, user_id).await?;
        report.pulled = true;

        // a pull can reveal local data the remote lacks (missing settings row)
        if self.has_dirty(identity, user_id) {
            self.ensure_current(generation)?;
            let follow_up = self.push_inner(identity, user_id, generation).await?;
            report.queued += follow_up.queued;
            report.replayed += follow_up.replayed;
            report.poisoned += follow_up.poisoned;
        }
        Ok(report)
    }

    fn queue_offline(&self, identity: &UserIdentity, user_id: &str) -> SyncResult<SyncReport> {
        let queued = self.enqueue_dirty(identity, user_id)?;
        log::info!("[SYNC] offline, queued {} actions for {}", queued, identity.identity_key());
        Ok(SyncReport {
            queued,
            offline: true,
            ..Default::default()
        })
    }

    // =====================================================================
    // Push
    // =====================================================================

    /// Queues every dirty entity, then replays the queue.
    ///
    /// # Arguments
    /// * `identity` - Authenticated identity whose entities are pushed.
    pub async fn push_all(&self, identity: &UserIdentity) -> SyncResult<SyncReport> {
        let user_id = identity.user_id().ok_or(SyncError::Disabled)?;
        self.push_inner(identity, user_id, self.generation()).await
    }

    async fn push_inner(&self, identity: &UserIdentity, user_id: &str, generation: u64) -> SyncResult<SyncReport> {
        let queued = self.enqueue_dirty(identity, user_id)?;
        let mut report = self.replay(identity, generation).await?;
        report.queued = queued;
        Ok(report)
    }

    fn has_dirty(&self, identity: &UserIdentity, user_id: &str) -> bool {
        let mut meta = self.inner.repo.load_sync_meta(identity);
        !self.plan(identity, user_id, &mut meta).is_empty()
    }

    /// Actions for everything changed since the last push, in push order:
    /// progress, settings, unlocked achievements, unsynced sessions.
    /// Advances the watermarks in `meta`.
    fn plan(&self, identity: &UserIdentity, user_id: &str, meta: &mut SyncMeta) -> Vec<PendingAction> {
        let repo = &self.inner.repo;
        let now = self.now();
        let mut actions = Vec::new();

        let progress = repo.load_progress(identity);
        if progress.updated_at > meta.progress_pushed_at {
            actions.push(PendingAction::upsert(
                tables::USER_PROGRESS,
                vec![rows::progress_to_row(user_id, &progress)],
                "user_id",
                now,
            ));
            meta.progress_pushed_at = progress.updated_at;
        }

        let settings = repo.load_settings(identity);
        if settings.updated_at > meta.settings_pushed_at || meta.settings_remote_missing {
            actions.push(PendingAction::upsert(
                tables::USER_SETTINGS,
                vec![rows::settings_to_row(user_id, &settings)],
                "user_id",
                now,
            ));
            meta.settings_pushed_at = meta.settings_pushed_at.max(settings.updated_at);
            meta.settings_remote_missing = false;
        }

        let unlocked: Vec<_> = repo
            .list_achievements(identity)
            .into_iter()
            .filter(|a| a.is_unlocked() && a.updated_at > meta.achievements_pushed_at)
            .collect();
        if let Some(newest) = unlocked.iter().map(|a| a.updated_at).max() {
            actions.push(PendingAction::upsert(
                tables::ACHIEVEMENTS,
                unlocked.iter().map(|a| rows::achievement_to_row(user_id, a)).collect(),
                "user_id,achievement_id",
                now,
            ));
            meta.achievements_pushed_at = newest;
        }

        let handled = self.session_ids_in_flight(identity);
        let fresh: Vec<_> = repo
            .list_unsynced_sessions(identity)
            .into_iter()
            .filter(|s| !handled.contains(&s.id))
            .collect();
        if !fresh.is_empty() {
            actions.push(PendingAction::insert_many(
                tables::GAME_SESSIONS,
                fresh.iter().map(|s| rows::session_to_row(user_id, s)).collect(),
                now,
            ));
        }

        actions
    }

    /// Session ids already referenced by a queued or poisoned insert.
    fn session_ids_in_flight(&self, identity: &UserIdentity) -> HashSet<String> {
        let key = identity.identity_key();
        let repo = &self.inner.repo;
        let poisoned = repo.dead_letters().into_iter().map(|d| d.action);

        repo.list_pending()
            .into_iter()
            .chain(poisoned)
            .filter(|a| a.op == PendingOp::Insert && a.collection == tables::GAME_SESSIONS)
            .filter(|a| a.identity_key.as_deref().map_or(true, |k| k == key))
            .flat_map(|a| a.rows())
            .filter_map(|row| row.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }

    /// Moves dirty entities into the queue. The queue write happens before the
    /// watermark write so a crash in between only re-queues idempotent upserts.
    /// Returns the number of actions appended.
    fn enqueue_dirty(&self, identity: &UserIdentity, user_id: &str) -> SyncResult<usize> {
        let repo = &self.inner.repo;
        let key = identity.identity_key();
        let mut meta = repo.load_sync_meta(identity);

        let mut appended = 0;
        for action in self.plan(identity, user_id, &mut meta) {
            let action = action.owned_by(key.clone());
            if let Some(waiting) = self.coalesce_target(&action) {
                log::debug!("[QUEUE] folding {:?} {} into {}", action.op, action.collection, waiting.id);
                repo.replace_pending(&fold_into(waiting, &action))?;
                continue;
            }
            log::debug!("[QUEUE] enqueue {:?} {} for {}", action.op, action.collection, key);
            if let Some(evicted) = repo.push_pending(action)? {
                log::warn!("[QUEUE] evicted {} ({})", evicted.id, evicted.collection);
            }
            appended += 1;
        }
        meta.last_push_at = Some(self.now());
        repo.save_sync_meta(identity, &meta)?;
        Ok(appended)
    }

    /// A queued, never attempted action of the same shape that `action` can be
    /// folded into instead of growing the queue.
    fn coalesce_target(&self, action: &PendingAction) -> Option<PendingAction> {
        // a running replay may be sending the candidate right now
        let _idle = self.inner.replay.try_lock().ok()?;
        self.inner.repo.list_pending().into_iter().find(|p| {
            p.attempts == 0
                && p.op == action.op
                && p.collection == action.collection
                && p.identity_key == action.identity_key
                && p.conflict_key == action.conflict_key
                && matches!(p.op, PendingOp::Insert | PendingOp::Upsert)
        })
    }

    // =====================================================================
    // Pull
    // =====================================================================

    /// Fetches remote progress, settings and achievements and merges them in.
    pub async fn pull_all(&self, identity: &UserIdentity) -> SyncResult<()> {
        let user_id = identity.user_id().ok_or(SyncError::Disabled)?;
        self.pull_inner(identity, user_id).await
    }

    async fn pull_inner(&self, identity: &UserIdentity, user_id: &str) -> SyncResult<()> {
        let repo = &self.inner.repo;
        let remote = &self.inner.remote;
        let selector = Selector::new().eq("user_id", user_id);
        let mut meta = repo.load_sync_meta(identity);

        // progress
        let row = self
            .call("fetch_one", remote.fetch_one(tables::USER_PROGRESS, &selector))
            .await?;
        if let Some(row) = row {
            let theirs = rows::progress_from_row(&row)?;
            let local = repo.load_progress(identity);
            let mut merged = merge_progress(&local, &theirs);
            if merged.same_counters(&theirs) {
                meta.progress_pushed_at = meta.progress_pushed_at.max(merged.updated_at);
            } else if merged.updated_at <= meta.progress_pushed_at {
                merged.updated_at = stamp_after(self.now(), meta.progress_pushed_at);
            }
            if merged != local {
                repo.save_progress(identity, &merged)?;
            }
        }

        // settings
        let row = self
            .call("fetch_one", remote.fetch_one(tables::USER_SETTINGS, &selector))
            .await?;
        match row {
            Some(row) => {
                let local = repo.load_settings(identity);
                let merged = merge_settings(&local, &rows::settings_from_row(&row)?);
                if merged != local {
                    repo.replace_settings(identity, &merged)?;
                }
                meta.settings_remote_missing = false;
                meta.settings_pushed_at = meta.settings_pushed_at.max(merged.updated_at);
            }
            None => {
                log::debug!("[SYNC] no remote settings for {}, local ones will be uploaded", user_id);
                meta.settings_remote_missing = true;
            }
        }

        // achievements
        let fetched = self
            .call("fetch_many", remote.fetch_many(tables::ACHIEVEMENTS, &selector))
            .await?;
        let theirs = fetched
            .iter()
            .map(rows::achievement_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let local = repo.list_achievements(identity);
        let mut merged = merge_achievements(&local, &theirs);
        for a in merged.iter_mut().filter(|a| a.is_unlocked()) {
            let remote_agrees = theirs.iter().any(|t| same_achievement(a, t));
            if !remote_agrees && a.updated_at <= meta.achievements_pushed_at {
                a.updated_at = stamp_after(self.now(), meta.achievements_pushed_at);
            }
        }
        if merged != local {
            repo.replace_achievements(identity, merged)?;
        }

        meta.last_pull_at = Some(self.now());
        repo.save_sync_meta(identity, &meta)?;
        log::debug!("[SYNC] pull merged for {}", identity.identity_key());
        Ok(())
    }
}

/// Merges the rows of `newer` into `waiting`. Inserts append; upserts
/// replace rows whose conflict columns match and append the rest.
fn fold_into(mut waiting: PendingAction, newer: &PendingAction) -> PendingAction {
    let mut rows = waiting.rows();
    let columns = newer.conflict_columns();
    for row in newer.rows() {
        let same_target = |r: &Row| !columns.is_empty() && columns.iter().all(|c| r.get(*c) == row.get(*c));
        match rows.iter_mut().find(|r| newer.op == PendingOp::Upsert && same_target(r)) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }
    waiting.payload = match <[Row; 1]>::try_from(rows) {
        Ok([row]) if waiting.op == PendingOp::Upsert => Value::Object(row),
        Ok([row]) => Value::Array(vec![Value::Object(row)]),
        Err(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
    };
    waiting
}
