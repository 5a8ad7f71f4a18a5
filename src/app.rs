//! Service wiring.
//!
//! `LearningCore` builds the repository, sync engine, session manager and
//! statistics aggregator from one config and shares a single event bus
//! between them.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::domain::{Progress, UserIdentity};
use crate::error::{StatsError, SyncError, SyncResult};
use crate::persistence::{KvStore, LocalRepository};
use crate::remote::RemoteApi;
use crate::session::{EventBus, SessionManager};
use crate::stats::{AchievementTracker, Adaptation, Attempt, SessionOutcome, StatisticsAggregator};
use crate::sync::{SyncEngine, SyncReport};

#[derive(Clone)]
pub struct LearningCore {
    config: CoreConfig,
    repo: LocalRepository,
    bus: EventBus,
    sync: SyncEngine,
    session: SessionManager,
    stats: Arc<StatisticsAggregator>,
}

impl LearningCore {
    /// Wires every service on one shared bus. `config` is taken as is; use
    /// `CoreConfig::validate` first when it comes from outside.
    ///
    /// # Arguments
    /// * `config` - Tuning shared by all services.
    /// * `kv` - Backing key-value store.
    /// * `remote` - Backend adapter, or `NoBackend` to stay local.
    /// * `clock` - Source of every timestamp.
    pub fn new(config: CoreConfig, kv: Arc<dyn KvStore>, remote: Arc<dyn RemoteApi>, clock: Arc<dyn Clock>) -> Self {
        let repo = LocalRepository::new(kv, clock).with_limits(config.max_pending_actions, config.max_dead_letters);
        let bus = EventBus::new();
        let sync = SyncEngine::new(repo.clone(), remote.clone(), bus.clone(), config.clone());
        let session = SessionManager::new(repo.clone(), remote, sync.clone(), bus.clone(), config.clone());
        let stats = StatisticsAggregator::new(repo.clone(), bus.clone(), config.clone())
            .with_achievements(AchievementTracker::new());

        Self {
            config,
            repo,
            bus,
            sync,
            session,
            stats: Arc::new(stats),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Namespaced local storage.
    pub fn repo(&self) -> &LocalRepository {
        &self.repo
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Push, pull and the offline queue.
    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// Identity lifecycle and sign-in.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn stats(&self) -> &StatisticsAggregator {
        &self.stats
    }

    /// Restores or mints the active identity.
    pub async fn start(&self) -> UserIdentity {
        self.session.start().await
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.session.current()
    }

    /// Progress of the active identity.
    pub fn progress(&self) -> Option<Progress> {
        self.identity().map(|identity| self.repo.load_progress(&identity))
    }

    /// Feeds one answer to the running session.
    ///
    /// # Arguments
    /// * `attempt` - The answer; its game must match the running session.
    pub fn on_attempt(&self, attempt: Attempt) -> Result<Adaptation, StatsError> {
        self.stats.on_attempt(attempt)
    }

    /// Ends the active play session for the active identity. For an account
    /// that is online, a background sync follows.
    pub fn end_session(&self) -> Result<SessionOutcome, StatsError> {
        let identity = self.identity().ok_or(StatsError::NoActiveSession)?;
        let outcome = self.stats.end_session(&identity)?;
        self.session.touch();

        if !identity.is_guest() && self.session.is_online() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let sync = self.sync.clone();
                    handle.spawn(async move {
                        if let Err(e) = sync.sync_all(&identity).await {
                            log::debug!("[SYNC] post-session sync failed: {}", e);
                        }
                    });
                }
                Err(_) => log::debug!("[SYNC] no runtime, post-session sync skipped"),
            }
        }
        Ok(outcome)
    }

    /// Syncs the active identity now.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        let identity = self.identity().ok_or(SyncError::Disabled)?;
        self.sync.sync_all(&identity).await
    }
}
