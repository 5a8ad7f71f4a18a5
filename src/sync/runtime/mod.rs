//! Imperative shell around `SyncMachine`.
//!
//! `SyncEngine` owns the machine, talks to the repository and the remote,
//! and executes the machine's commands. It is cheap to clone; all clones
//! share one state.

mod import;
mod orchestrator;
mod replay;
mod scheduler;


use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::domain::{DeadLetter, PendingAction, UserIdentity};
use crate::error::{RemoteResult, SyncError, SyncResult};
use crate::persistence::LocalRepository;
use crate::remote::{with_deadline, RemoteApi};
use crate::session::events::EventBus;
use crate::sync::engine::{SyncMachine, SyncState};

/// Outcome of a sync, push or queue replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Actions added to the queue by this run.
    pub queued: usize,
    /// Queued actions applied remotely.
    pub replayed: usize,
    /// Actions moved to the dead-letter set.
    pub poisoned: usize,
    pub pulled: bool,
    /// Nothing was sent; changes were only queued.
    pub offline: bool,
}

type SharedSync = Shared<BoxFuture<'static, SyncResult<SyncReport>>>;

struct Inner {
    repo: LocalRepository,
    remote: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    config: CoreConfig,

    machine: Mutex<SyncMachine>,
    active: Mutex<Option<UserIdentity>>,
    /// Bumped on every identity switch; stale work checks it and stops.
    generation: AtomicU64,
    /// One shared sync future per identity key.
    in_flight: Mutex<HashMap<String, SharedSync>>,
    /// Serializes queue replay.
    replay: tokio::sync::Mutex<()>,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
    auth_lost: broadcast::Sender<UserIdentity>,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Creates an engine with no active identity. Sync stays `Disabled`
    /// until `switch_identity` names an authenticated one.
    ///
    /// # Arguments
    /// * `repo` - Local store holding the entities, the queue and sync metadata.
    /// * `remote` - Backend adapter; `NoBackend` keeps sync disabled.
    /// * `bus` - Receives `syncStateChanged` events.
    /// * `config` - Deadlines, backoff and retry limits.
    pub fn new(repo: LocalRepository, remote: Arc<dyn RemoteApi>, bus: EventBus, config: CoreConfig) -> Self {
        let (auth_lost, _) = broadcast::channel(8);
        let clock = repo.clock().clone();
        let machine = SyncMachine::new(config.backoff_initial_ms, config.backoff_max_ms);
        Self {
            inner: Arc::new(Inner {
                repo,
                remote,
                clock,
                bus,
                config,
                machine: Mutex::new(machine),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
                replay: tokio::sync::Mutex::new(()),
                auto_sync: Mutex::new(None),
                auth_lost,
            }),
        }
    }

    /// Current state of the sync machine.
    pub fn state(&self) -> SyncState {
        self.inner.machine.lock().state()
    }

    /// Message of the last failed run, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.inner.machine.lock().last_error().map(str::to_string)
    }

    pub fn active_identity(&self) -> Option<UserIdentity> {
        self.inner.active.lock().clone()
    }

    /// Snapshot of the offline queue in replay order, all owners included.
    pub fn pending(&self) -> Vec<PendingAction> {
        self.inner.repo.list_pending()
    }

    /// Actions given up on, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.repo.dead_letters()
    }

    /// Fires with the identity whose remote session was found invalid.
    pub fn auth_lost(&self) -> broadcast::Receiver<UserIdentity> {
        self.inner.auth_lost.subscribe()
    }

    /// Adds a mutation to the offline queue, owned by the active identity
    /// unless it already names an owner.
    pub fn enqueue_offline(&self, mut action: PendingAction) -> SyncResult<()> {
        if action.identity_key.is_none() {
            action.identity_key = self.active_identity().map(|i| i.identity_key());
        }
        if let Some(evicted) = self.inner.repo.push_pending(action)? {
            log::warn!("[QUEUE] evicted {} ({}) to make room", evicted.id, evicted.collection);
        }
        Ok(())
    }

    fn now(&self) -> u64 {
        self.inner.clock.now()
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, generation: u64) -> SyncResult<()> {
        if self.generation() == generation {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    /// Remote call under the configured deadline.
    async fn call<T, F>(&self, op: &str, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        with_deadline(self.inner.config.remote_deadline(), op, fut).await
    }
}
