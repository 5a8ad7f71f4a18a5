//! Key/value backing stores.
//!
//! Keys and values are plain strings; typed access lives in the repository.
//! Writes are atomic per key. There is no ordering across keys.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{StorageError, StorageResult};

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;
    fn delete(&self, key: &str) -> StorageResult<()>;
    /// All keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> StorageResult<BTreeSet<String>>;
}

fn keys_with_prefix(map: &BTreeMap<String, String>, prefix: &str) -> BTreeSet<String> {
    map.range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

// =====================================================================
// In-memory store
// =====================================================================

/// Process-local store. Can simulate a missing backend and a byte quota.
#[derive(Debug)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
    available: AtomicBool,
    quota_bytes: Option<usize>,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            quota_bytes: None,
        }
    }

    /// Total bytes (keys + values) the store may hold.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory store disabled".into()))
        }
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_available()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        if let Some(quota) = self.quota_bytes {
            let current: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if current + key.len() + value.len() > quota {
                return Err(StorageError::Unavailable(format!(
                    "quota of {quota} bytes exceeded writing `{key}`"
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StorageResult<BTreeSet<String>> {
        self.check_available()?;
        Ok(keys_with_prefix(&self.entries.lock(), prefix))
    }
}

// =====================================================================
// File-backed store
// =====================================================================

/// Single JSON document on disk, rewritten through a temp file + rename on
/// every write so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKvStore {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    let corrupt = path.with_extension("corrupt");
                    log::warn!(
                        "[KV] store file {} is unreadable ({}), moving it to {}",
                        path.display(),
                        e,
                        corrupt.display()
                    );
                    std::fs::rename(&path, &corrupt).map_err(|e| StorageError::Unavailable(e.to_string()))?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Unavailable(e.to_string())),
        };

        log::debug!("[KV] opened {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let raw = serde_json::to_string(entries).map_err(|e| StorageError::Invariant(e.to_string()))?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| StorageError::Unavailable(e.to_string()))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    /// Applies `change` and persists; the in-memory map is rolled back if the write fails.
    fn mutate(&self, key: &str, change: Option<&str>) -> StorageResult<()> {
        let mut entries = self.entries.lock();
        let previous = match change {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(key),
        };
        if let Err(e) = self.flush(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            log::warn!("[KV] write of `{}` failed: {}", key, e);
            return Err(e);
        }
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mutate(key, Some(value))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        if !self.entries.lock().contains_key(key) {
            return Ok(());
        }
        self.mutate(key, None)
    }

    fn keys(&self, prefix: &str) -> StorageResult<BTreeSet<String>> {
        Ok(keys_with_prefix(&self.entries.lock(), prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_listing() {
        let kv = MemoryKvStore::new();
        kv.put("progress:guest:a", "1").unwrap();
        kv.put("progress:user:b", "2").unwrap();
        kv.put("settings:guest:a", "3").unwrap();

        let guest = kv.keys("progress:guest:").unwrap();
        let user = kv.keys("progress:user:").unwrap();
        assert_eq!(guest.len(), 1);
        assert_eq!(user.len(), 1);
        assert!(guest.is_disjoint(&user));
    }

    #[test]
    fn unavailable_store_fails_every_op() {
        let kv = MemoryKvStore::new();
        kv.set_available(false);
        assert!(matches!(kv.get("k"), Err(StorageError::Unavailable(_))));
        assert!(matches!(kv.put("k", "v"), Err(StorageError::Unavailable(_))));
        assert!(matches!(kv.keys(""), Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn quota_rejects_oversized_write_and_keeps_old_value() {
        let kv = MemoryKvStore::new().with_quota(16);
        kv.put("k", "small").unwrap();
        assert!(kv.put("k", "this value is far too large").is_err());
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let kv = FileKvStore::open(&path).unwrap();
            kv.put("guest_id", "\"g-1\"").unwrap();
            kv.put("tmp", "x").unwrap();
            kv.delete("tmp").unwrap();
        }
        let kv = FileKvStore::open(&path).unwrap();
        assert_eq!(kv.get("guest_id").unwrap().as_deref(), Some("\"g-1\""));
        assert_eq!(kv.get("tmp").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{broken").unwrap();

        let kv = FileKvStore::open(&path).unwrap();
        assert!(kv.keys("").unwrap().is_empty());
        assert!(path.with_extension("corrupt").exists());
    }
}
