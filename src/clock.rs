use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond wall-clock source.
///
/// Everything that needs "now" (timeouts, guest expiry, session durations,
/// backoff deadlines) goes through this trait so tests can drive time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> u64;

    /// Elapsed milliseconds since `t`. Never negative.
    fn monotonic_since(&self, t: u64) -> u64 {
        self.now().saturating_sub(t)
    }
}

/// System clock that never reports a value lower than one it already returned.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        // fetch_max returns the previous value
        let prev = self.last.fetch_max(wall, Ordering::SeqCst);
        prev.max(wall)
    }
}

/// Hand-driven clock for tests and the demo CLI.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// `updatedAt` for a new revision: `now`, but always past `previous`.
pub fn stamp_after(now: u64, previous: u64) -> u64 {
    now.max(previous.saturating_add(1))
}
