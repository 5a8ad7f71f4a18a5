use crate::sync::engine::types::SyncState;

#[derive(Debug, Clone)]
pub struct MachineState {
    pub state: SyncState,
    pub authenticated: bool,
    pub online: bool,

    /// Backoff applied on the next failure.
    pub next_backoff_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// While cooling, ticks before this instant are ignored.
    pub cooling_until: Option<u64>,

    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl MachineState {
    pub fn new(backoff_initial_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            state: SyncState::Disabled,
            authenticated: false,
            online: true,
            next_backoff_ms: backoff_initial_ms,
            backoff_initial_ms,
            backoff_max_ms,
            cooling_until: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Where the machine rests when nothing is running.
    pub fn resting_state(&self) -> SyncState {
        match (self.online, self.authenticated) {
            (false, _) => SyncState::Offline,
            (true, false) => SyncState::Disabled,
            (true, true) => SyncState::Idle,
        }
    }

    pub fn reset_backoff(&mut self) {
        self.next_backoff_ms = self.backoff_initial_ms;
        self.cooling_until = None;
        self.consecutive_failures = 0;
    }
}
