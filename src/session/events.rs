//! Typed, synchronous event bus.
//!
//! `emit` calls every listener in subscription order on the caller's task.
//! A listener that returns an error or panics is logged and skipped; the
//! remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{IdentityMode, Progress, SessionRecord, UserIdentity, UserProfile};
use crate::sync::engine::SyncState;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    UserReady {
        identity: UserIdentity,
        mode: IdentityMode,
    },
    UserAuthenticated {
        identity: UserIdentity,
        profile: UserProfile,
    },
    UserSignedOut {
        previous_identity: UserIdentity,
    },
    UserSwitched {
        identity: UserIdentity,
    },
    NetworkStatusChanged {
        online: bool,
    },
    ProgressUpdated {
        identity: UserIdentity,
        progress: Progress,
        session: SessionRecord,
    },
    SyncStateChanged {
        state: SyncState,
        last_error: Option<String>,
    },
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::UserReady { .. } => "userReady",
            CoreEvent::UserAuthenticated { .. } => "userAuthenticated",
            CoreEvent::UserSignedOut { .. } => "userSignedOut",
            CoreEvent::UserSwitched { .. } => "userSwitched",
            CoreEvent::NetworkStatusChanged { .. } => "networkStatusChanged",
            CoreEvent::ProgressUpdated { .. } => "progressUpdated",
            CoreEvent::SyncStateChanged { .. } => "syncStateChanged",
        }
    }
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&CoreEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CoreEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        log::debug!("[BUS] listener {} subscribed", id);
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Delivers `event` to every listener. Returns how many failed.
    pub fn emit(&self, event: CoreEvent) -> usize {
        // listeners may (un)subscribe while being called
        let snapshot: Vec<(ListenerId, Listener)> = self.inner.listeners.lock().clone();
        log::debug!("[BUS] emit {} to {} listeners", event.name(), snapshot.len());

        let mut failures = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    log::warn!("[BUS] listener {} failed on {}: {:#}", id, event.name(), e);
                }
                Err(_) => {
                    failures += 1;
                    log::warn!("[BUS] listener {} panicked on {}", id, event.name());
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(online: bool) -> CoreEvent {
        CoreEvent::NetworkStatusChanged { online }
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(|_| anyhow::bail!("broken listener"));
        bus.subscribe(|_| panic!("panicking listener"));
        let sink = seen.clone();
        bus.subscribe(move |e| {
            sink.lock().push(e.name());
            Ok(())
        });

        assert_eq!(bus.emit(online(true)), 2);
        assert_eq!(*seen.lock(), vec!["networkStatusChanged"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(online(true));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(online(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
