//! In-memory key-value backend.

use super::{KvBackend, KvResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Map-backed store. Clones share the same entries, so a test can keep one
/// clone for inspection while the worker owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvBackend {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value for `key` without going through the worker.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns all keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KvBackend for MemoryKvBackend {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> KvResult<()> {
        self.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
