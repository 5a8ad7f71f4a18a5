use crate::clock::stamp_after;
use crate::domain::{Progress, UserIdentity};
use crate::error::{SyncError, SyncResult};
use crate::sync::merge::{merge_achievements, merge_progress, same_achievement};

use super::SyncEngine;

impl SyncEngine {
    /// Folds a guest's local data into an authenticated namespace, once per
    /// `(guest, user)` pair. Counters take the element-wise max, settings are
    /// copied only if the user has none, achievements are unioned and
    /// unsynced sessions are carried over. Carried sessions are marked synced
    /// on the guest side so a later import into another account does not
    /// take them again.
    ///
    /// Returns `false` if this pair was already imported.
    pub fn import_guest_to_user(&self, guest: &UserIdentity, user: &UserIdentity) -> SyncResult<bool> {
        let (Some(guest_id), Some(_)) = (guest.guest_id(), user.user_id()) else {
            return Err(SyncError::Invariant("import needs a guest and an authenticated identity".into()));
        };
        let repo = &self.inner.repo;
        let mut meta = repo.load_sync_meta(user);
        if meta.imported_guests.iter().any(|g| g == guest_id) {
            log::debug!("[IMPORT] {} already imported into {}", guest_id, user.identity_key());
            return Ok(false);
        }
        let now = self.now();

        let guest_progress = repo.load_progress(guest);
        if guest_progress.counters() != Progress::default().counters() {
            let mine = repo.load_progress(user);
            let mut merged = merge_progress(&mine, &guest_progress);
            if !merged.same_counters(&mine) {
                merged.updated_at = stamp_after(now, mine.updated_at);
                repo.save_progress(user, &merged)?;
            }
        }

        if !repo.has_settings(user) && repo.has_settings(guest) {
            let mut settings = repo.load_settings(guest);
            settings.updated_at = stamp_after(now, settings.updated_at);
            repo.replace_settings(user, &settings)?;
        }

        let mine = repo.list_achievements(user);
        let guest_achievements = repo.list_achievements(guest);
        if !guest_achievements.is_empty() {
            let mut merged = merge_achievements(&mine, &guest_achievements);
            for a in merged.iter_mut() {
                let unchanged = mine.iter().any(|m| same_achievement(m, a));
                if !unchanged {
                    a.updated_at = stamp_after(now, a.updated_at);
                }
            }
            if merged != mine {
                repo.replace_achievements(user, merged)?;
            }
        }

        let known: Vec<String> = repo.list_sessions(user).into_iter().map(|s| s.id).collect();
        let pending = repo.list_unsynced_sessions(guest);
        let mut carried = 0;
        for record in &pending {
            if known.contains(&record.id) {
                continue;
            }
            repo.append_session(user, record)?;
            carried += 1;
        }
        let handed_over: Vec<&str> = pending.iter().map(|s| s.id.as_str()).collect();
        repo.mark_sessions_synced(guest, &handed_over)?;

        meta.imported_guests.push(guest_id.to_string());
        repo.save_sync_meta(user, &meta)?;
        log::info!(
            "[IMPORT] guest {} imported into {} ({} sessions)",
            guest_id,
            user.identity_key(),
            carried
        );
        Ok(true)
    }
}
