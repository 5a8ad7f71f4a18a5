use std::time::Duration;

use rand::Rng;

use crate::sync::engine::{SyncCommand, SyncEvent};

use super::SyncEngine;

/// `base` shifted by a random fraction within `+/- jitter`.
pub(crate) fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    base.mul_f64(factor.max(0.0))
}

impl SyncEngine {
    /// Starts the periodic timer. Any previous timer is replaced.
    pub fn start_auto_sync(&self, interval: Duration) {
        self.stop_auto_sync();
        let jitter = self.inner.config.auto_sync_jitter;
        let this = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(jittered(interval, jitter)).await;
                this.tick();
            }
        });
        log::info!("[SCHED] auto-sync every {:?} (+/- {:.0}%)", interval, jitter * 100.0);
        *self.inner.auto_sync.lock() = Some(handle);
    }

    /// Cancels the periodic timer. Safe to call when none is running.
    pub fn stop_auto_sync(&self) {
        if let Some(handle) = self.inner.auto_sync.lock().take() {
            handle.abort();
            log::info!("[SCHED] auto-sync stopped");
        }
    }

    pub fn is_auto_syncing(&self) -> bool {
        self.inner
            .auto_sync
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// One timer tick. Skipped while a sync for the active identity is running;
    /// otherwise the machine decides (cooling, disabled, offline).
    pub(super) fn tick(&self) {
        let Some(identity) = self.active_identity() else { return };
        if identity.is_guest() {
            return;
        }
        let key = identity.identity_key();

        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.contains_key(&key) {
            log::debug!("[SCHED] tick skipped, sync in progress for {}", key);
            return;
        }
        let cmds = self.process_machine(SyncEvent::Tick { now: self.now() });
        if cmds.contains(&SyncCommand::RunSync) {
            let flight = self.flight(identity, true);
            in_flight.insert(key, flight.clone());
            drop(in_flight);
            tokio::spawn(async move {
                // outcome already reported to the machine and the bus
                let _ = flight.await;
            });
        }
    }
}
