pub mod app;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod remote;
pub mod session;
pub mod stats;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clock::SystemClock;
use crate::config::CoreConfig;
use crate::persistence::FileKvStore;
use crate::remote::RemoteApi;

pub use app::LearningCore;

pub const DB_PATH: &str = "kindermath_db.json";

/// Opens (or creates) the file-backed store at `path` and wires a core on
/// top of it with the wall clock.
pub fn setup_core(path: impl AsRef<Path>, config: CoreConfig, remote: Arc<dyn RemoteApi>) -> Result<LearningCore> {
    let path = path.as_ref();
    config.validate()?;
    let kv = FileKvStore::open(path).with_context(|| format!("opening store {}", path.display()))?;
    log::info!("[KV] store opened at {}", path.display());

    Ok(LearningCore::new(config, Arc::new(kv), remote, Arc::new(SystemClock::new())))
}
