use std::fmt;

use serde::Serialize;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncState {
    Idle,
    Syncing,
    Cooling,
    Offline,
    Disabled,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Cooling => "cooling",
            SyncState::Offline => "offline",
            SyncState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Inputs to the machine. Times are ms since epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Explicit `sync_all`.
    SyncRequested { now: u64 },
    /// Auto-sync timer fired.
    Tick { now: u64 },
    SyncSucceeded,
    SyncFailed { now: u64, error: RemoteError },
    /// A local failure ended the run; no backoff.
    SyncAborted { reason: String },
    WentOffline,
    WentOnline,
    SignedIn,
    SignedOut,
}

/// Side effects for the runtime to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    RunSync,
    DrainQueue,
    StopAutoSync,
    Publish {
        state: SyncState,
        last_error: Option<String>,
    },
}
