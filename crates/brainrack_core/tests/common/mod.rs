#![allow(dead_code)]

use brainrack_core::{Clock, KvBackend, KvError, KvResult, MemoryKvBackend};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// One backend call seen by `RecordingBackend`.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Get(String),
    Set(String, Value),
    Remove(String),
}

/// Memory backend that records every call and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    pub memory: MemoryKvBackend,
    ops: Arc<Mutex<Vec<Op>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Payloads of every `set` on `key`, oldest first.
    pub fn writes_to(&self, key: &str) -> Vec<Value> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Set(written, value) if written == key => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn removes_of(&self, key: &str) -> usize {
        self.ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Remove(removed) if removed == key))
            .count()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn seed(&self, key: &str, value: Value) {
        self.memory.set(key, &value).unwrap();
    }
}

impl KvBackend for RecordingBackend {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        self.ops.lock().unwrap().push(Op::Get(key.to_string()));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KvError::Backend("read refused".to_string()));
        }
        self.memory.get(key)
    }

    fn set(&self, key: &str, value: &Value) -> KvResult<()> {
        self.ops
            .lock()
            .unwrap()
            .push(Op::Set(key.to_string(), value.clone()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Backend("write refused".to_string()));
        }
        self.memory.set(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.ops.lock().unwrap().push(Op::Remove(key.to_string()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Backend("remove refused".to_string()));
        }
        self.memory.remove(key)
    }
}

/// Clock advancing by a fixed step on every read.
pub struct StepClock {
    next: AtomicI64,
    step: i64,
}

impl StepClock {
    pub fn new(start: i64, step: i64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(start),
            step,
        })
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Texts of a stored thought collection, in order.
pub fn stored_texts(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["text"].as_str().unwrap().to_string())
        .collect()
}
