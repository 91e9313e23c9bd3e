//! Per-release rescan serialization (§4.9, §5): concurrent
//! `on_rescan_dir` calls on the same release path block on a shared
//! mutex; calls on distinct release paths proceed in parallel. Entries
//! are reference-counted and dropped from the table once the last
//! holder releases its guard.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

struct GuardEntry {
    mutex: Arc<Mutex<()>>,
    refcount: usize,
}

struct TableInner {
    entries: Mutex<HashMap<String, GuardEntry>>,
}

/// Shared table of per-release mutexes.
#[derive(Clone)]
pub struct RescanGuardTable {
    inner: Arc<TableInner>,
}

impl RescanGuardTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TableInner { entries: Mutex::new(HashMap::new()) }),
        }
    }

    /// Block until `key`'s mutex is free, then hold it until the
    /// returned guard is dropped.
    pub fn acquire(&self, key: &str) -> RescanGuard {
        let mutex = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.to_string()).or_insert_with(|| GuardEntry {
                mutex: Arc::new(Mutex::new(())),
                refcount: 0,
            });
            entry.refcount += 1;
            entry.mutex.clone()
        };
        let locked = Mutex::lock_arc(&mutex);
        RescanGuard {
            table: self.inner.clone(),
            key: key.to_string(),
            _locked: locked,
        }
    }

    /// Number of distinct release paths with a live guard, for testing
    /// and diagnostics.
    pub fn live_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

impl Default for RescanGuardTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one rescan. Dropping it releases the
/// per-release mutex and, if this was the last holder, removes the
/// table entry.
pub struct RescanGuard {
    table: Arc<TableInner>,
    key: String,
    _locked: ArcMutexGuard<RawMutex, ()>,
}

impl Drop for RescanGuard {
    fn drop(&mut self) {
        let mut entries = self.table.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                entries.remove(&self.key);
            }
        }
    }
}
