//! Sync: a pure decision machine (`engine`), merge rules (`merge`) and the
//! async shell that talks to storage and the remote (`runtime`).

pub mod engine;
pub mod merge;
pub mod runtime;

pub use engine::{SyncMachine, SyncState};
pub use runtime::{SyncEngine, SyncReport};
