use serde::{Deserialize, Serialize};

use crate::persistence::codec::Schema;

/// Per-identity bookkeeping for the sync engine.
///
/// Watermarks hold the `updatedAt` of the last value handed to the remote
/// (directly or through the queue). An entity is dirty while its local
/// `updatedAt` is above the watermark.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMeta {
    pub progress_pushed_at: u64,
    pub settings_pushed_at: u64,
    pub achievements_pushed_at: u64,
    /// The last pull found no remote settings row, so local ones must be uploaded.
    pub settings_remote_missing: bool,
    /// Guest ids already imported into this (authenticated) namespace.
    pub imported_guests: Vec<String>,
    pub last_push_at: Option<u64>,
    pub last_pull_at: Option<u64>,
}

impl Schema for SyncMeta {
    const NAME: &'static str = "SyncMeta";
}
