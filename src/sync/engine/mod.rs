//! Sync decision engine.
//!
//! A pure state machine over `{Idle, Syncing, Cooling, Offline, Disabled}`:
//! - **Input**: `SyncEvent` (requests, timer ticks, outcomes, connectivity, auth).
//! - **Output**: `Vec<SyncCommand>` for the runtime to execute.
//!
//! It never touches storage or the network and never awaits. Given the same
//! sequence of events the output is always identical.

mod logic;
pub mod state;
pub mod types;


pub use types::{SyncCommand, SyncEvent, SyncState};

use logic::*;
use state::MachineState;

#[derive(Debug, Clone)]
pub struct SyncMachine {
    state: MachineState,
}

impl SyncMachine {
    pub fn new(backoff_initial_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            state: MachineState::new(backoff_initial_ms, backoff_max_ms),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    pub fn cooling_until(&self) -> Option<u64> {
        self.state.cooling_until
    }

    pub fn is_online(&self) -> bool {
        self.state.online
    }

    pub fn handle_event(&mut self, event: SyncEvent) -> Vec<SyncCommand> {
        log::trace!("[SYNC] handle_event({:?}) in {}", event, self.state.state);
        match event {
            SyncEvent::SyncRequested { now } => on_sync_requested(&mut self.state, now),
            SyncEvent::Tick { now } => on_tick(&mut self.state, now),
            SyncEvent::SyncSucceeded => on_sync_succeeded(&mut self.state),
            SyncEvent::SyncFailed { now, error } => on_sync_failed(&mut self.state, now, &error),
            SyncEvent::SyncAborted { reason } => on_sync_aborted(&mut self.state, reason),
            SyncEvent::WentOffline => on_went_offline(&mut self.state),
            SyncEvent::WentOnline => on_went_online(&mut self.state),
            SyncEvent::SignedIn => on_signed_in(&mut self.state),
            SyncEvent::SignedOut => on_signed_out(&mut self.state),
        }
    }
}
