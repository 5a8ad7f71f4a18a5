use std::collections::HashMap;

use serde_json::Value;

use crate::domain::{PendingAction, PendingOp, UserIdentity};
use crate::error::{RemoteError, RemoteResult, SyncError, SyncResult};
use crate::remote::{rows, tables, Row, Selector};
use crate::sync::engine::SyncState;
use crate::sync::merge::{merge_achievements, merge_progress};

use super::{SyncEngine, SyncReport};

/// What replay does with an action after one attempt.
#[derive(Debug, PartialEq)]
enum Outcome {
    Applied,
    Poison(String),
    Retry(RemoteError),
    Abort(RemoteError),
}

fn classify(op: PendingOp, result: RemoteResult<()>) -> Outcome {
    match result {
        Ok(()) => Outcome::Applied,
        Err(RemoteError::NotAuthenticated) => Outcome::Abort(RemoteError::NotAuthenticated),
        Err(e) if e.is_transient() => Outcome::Retry(e),
        // already gone
        Err(RemoteError::NotFound(_)) if op == PendingOp::Delete => Outcome::Applied,
        // rows with these ids already exist remotely
        Err(RemoteError::Conflict(_)) if op == PendingOp::Insert => Outcome::Applied,
        Err(e) => Outcome::Poison(format!("{}: {}", e.kind(), e)),
    }
}

fn user_id_of(row: &Row) -> RemoteResult<&str> {
    row.get("user_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::SchemaMismatch("row without user_id".into()))
}

impl SyncEngine {
    /// Replays the active identity's queued actions in insertion order until
    /// the queue is empty or an action fails. Actions owned by another
    /// identity are left in place.
    pub async fn drain_queue(&self) -> SyncResult<SyncReport> {
        let identity = self
            .active_identity()
            .filter(|i| !i.is_guest())
            .ok_or(SyncError::Disabled)?;
        let generation = self.generation();

        let result = self.replay(&identity, generation).await;
        // a running sync reports its own outcome
        if self.state() != SyncState::Syncing {
            self.finish(generation, &result);
        }
        result
    }

    pub(super) async fn replay(&self, identity: &UserIdentity, generation: u64) -> SyncResult<SyncReport> {
        let _serial = self.inner.replay.lock().await;
        let repo = &self.inner.repo;
        let key = identity.identity_key();
        let mut report = SyncReport::default();

        loop {
            self.ensure_current(generation)?;

            let next = repo
                .list_pending()
                .into_iter()
                .find(|a| a.identity_key.as_deref().map_or(true, |k| k == key));
            let Some(action) = next else { break };

            log::debug!(
                "[QUEUE] replay {} {:?} {} (attempt {})",
                action.id,
                action.op,
                action.collection,
                action.attempts + 1
            );

            match self.apply_with_policy(&action).await {
                Outcome::Applied => {
                    repo.remove_pending(&action.id)?;
                    self.after_applied(identity, &action)?;
                    report.replayed += 1;
                }
                Outcome::Poison(reason) => {
                    repo.dead_letter(&action, &reason)?;
                    report.poisoned += 1;
                    self.publish_error(&reason);
                }
                Outcome::Retry(error) => {
                    let mut failed = action.clone();
                    failed.attempts += 1;
                    failed.last_error = Some(error.to_string());
                    if failed.attempts >= self.inner.config.max_replay_attempts {
                        let reason = format!("gave up after {} attempts: {}", failed.attempts, error);
                        repo.dead_letter(&failed, &reason)?;
                        self.publish_error(&reason);
                    } else {
                        repo.replace_pending(&failed)?;
                    }
                    return Err(error.into());
                }
                Outcome::Abort(error) => return Err(error.into()),
            }
        }

        if report.replayed + report.poisoned > 0 {
            log::info!(
                "[QUEUE] replayed {} poisoned {} for {}",
                report.replayed,
                report.poisoned,
                key
            );
        }
        Ok(report)
    }

    fn publish_error(&self, reason: &str) {
        let state = self.state();
        self.inner.bus.emit(crate::session::events::CoreEvent::SyncStateChanged {
            state,
            last_error: Some(reason.to_string()),
        });
    }

    /// Local bookkeeping once an action is applied remotely.
    fn after_applied(&self, identity: &UserIdentity, action: &PendingAction) -> SyncResult<()> {
        if action.op == PendingOp::Insert && action.collection == tables::GAME_SESSIONS {
            let rows = action.rows();
            let ids: Vec<&str> = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_str))
                .collect();
            let marked = self.inner.repo.mark_sessions_synced(identity, &ids)?;
            log::debug!("[QUEUE] marked {} sessions synced", marked);
        }
        Ok(())
    }

    async fn apply_with_policy(&self, action: &PendingAction) -> Outcome {
        let result = match self.apply_action(action).await {
            Err(RemoteError::Conflict(msg)) if action.op == PendingOp::Upsert => {
                log::warn!("[QUEUE] conflict on {} ({}), merging again: {}", action.id, action.collection, msg);
                self.apply_action(action).await
            }
            other => other,
        };
        classify(action.op, result)
    }

    /// One remote attempt. Progress and achievement upserts are merged with
    /// the current remote row first so they never lower remote values.
    async fn apply_action(&self, action: &PendingAction) -> RemoteResult<()> {
        let remote = &self.inner.remote;
        let collection = action.collection.as_str();

        match action.op {
            PendingOp::Insert => {
                self.call("insert_many", remote.insert_many(collection, action.rows()))
                    .await?;
            }
            PendingOp::Upsert => {
                let conflict = action.conflict_columns();
                if conflict.is_empty() {
                    return Err(RemoteError::SchemaMismatch("upsert without conflict key".into()));
                }
                let rows = match collection {
                    tables::USER_PROGRESS => self.merged_progress_rows(action.rows()).await?,
                    tables::ACHIEVEMENTS => self.merged_achievement_rows(action.rows()).await?,
                    _ => action.rows(),
                };
                self.call("upsert_many", remote.upsert_many(collection, rows, &conflict))
                    .await?;
            }
            PendingOp::Update => {
                let selector = action
                    .selector
                    .as_ref()
                    .ok_or_else(|| RemoteError::SchemaMismatch("update without selector".into()))?;
                let patch = action.rows().into_iter().next().unwrap_or_default();
                self.call("update", remote.update(collection, selector, patch))
                    .await?;
            }
            PendingOp::Delete => {
                let selector = action
                    .selector
                    .as_ref()
                    .ok_or_else(|| RemoteError::SchemaMismatch("delete without selector".into()))?;
                self.call("delete", remote.delete(collection, selector)).await?;
            }
        }
        Ok(())
    }

    async fn merged_progress_rows(&self, queued: Vec<Row>) -> RemoteResult<Vec<Row>> {
        let mut out = Vec::with_capacity(queued.len());
        for row in queued {
            let user_id = user_id_of(&row)?;
            let local = rows::progress_from_row(&row)?;
            let selector = Selector::new().eq("user_id", user_id);
            let existing = self
                .call("fetch_one", self.inner.remote.fetch_one(tables::USER_PROGRESS, &selector))
                .await?;
            let merged = match existing {
                Some(theirs) => merge_progress(&local, &rows::progress_from_row(&theirs)?),
                None => local,
            };
            out.push(rows::progress_to_row(user_id, &merged));
        }
        Ok(out)
    }

    async fn merged_achievement_rows(&self, queued: Vec<Row>) -> RemoteResult<Vec<Row>> {
        let mut by_user: HashMap<String, Vec<crate::domain::Achievement>> = HashMap::new();
        for row in &queued {
            by_user
                .entry(user_id_of(row)?.to_string())
                .or_default()
                .push(rows::achievement_from_row(row)?);
        }

        let mut out = Vec::with_capacity(queued.len());
        for (user_id, local) in by_user {
            let selector = Selector::new().eq("user_id", user_id.as_str());
            let fetched = self
                .call("fetch_many", self.inner.remote.fetch_many(tables::ACHIEVEMENTS, &selector))
                .await?;
            let theirs = fetched
                .iter()
                .map(rows::achievement_from_row)
                .collect::<RemoteResult<Vec<_>>>()?;

            // only the queued ids are written back
            for merged in merge_achievements(&local, &theirs).iter().take(local.len()) {
                out.push(rows::achievement_to_row(&user_id, merged));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let net = RemoteError::NetworkUnavailable("x".into());
        assert_eq!(classify(PendingOp::Upsert, Err(net.clone())), Outcome::Retry(net));
        assert_eq!(
            classify(PendingOp::Delete, Err(RemoteError::NotFound("x".into()))),
            Outcome::Applied
        );
        assert!(matches!(
            classify(PendingOp::Update, Err(RemoteError::NotFound("x".into()))),
            Outcome::Poison(_)
        ));
        assert!(matches!(
            classify(PendingOp::Upsert, Err(RemoteError::SchemaMismatch("x".into()))),
            Outcome::Poison(_)
        ));
        assert_eq!(
            classify(PendingOp::Insert, Err(RemoteError::NotAuthenticated)),
            Outcome::Abort(RemoteError::NotAuthenticated)
        );
    }
}
