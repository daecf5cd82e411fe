//! Asynchronous, order-preserving access to a `KvBackend`.
//!
//! # Responsibility
//! - Own the backend on a single worker task.
//! - Enqueue requests synchronously so issue order equals apply order.
//!
//! # Invariants
//! - Every request is enqueued before the issuing call returns.
//! - Dropping a `PendingWrite` never cancels the write.

use super::{KvBackend, KvError, KvResult};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

enum Request {
    Get {
        key: String,
        reply: oneshot::Sender<KvResult<Option<Value>>>,
    },
    Set {
        key: String,
        value: Value,
        reply: oneshot::Sender<KvResult<()>>,
    },
    Remove {
        key: String,
        reply: oneshot::Sender<KvResult<()>>,
    },
    Barrier {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the store worker.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Request>,
}

/// Completion of an issued write or remove.
///
/// Awaiting is optional: the write is already queued.
#[must_use = "the write is queued either way; call `wait` to observe its result"]
pub struct PendingWrite {
    rx: oneshot::Receiver<KvResult<()>>,
}

impl PendingWrite {
    fn ready(result: KvResult<()>) -> Self {
        let (reply, rx) = oneshot::channel();
        let _ = reply.send(result);
        Self { rx }
    }

    /// Waits for the backend to apply the request.
    pub async fn wait(self) -> KvResult<()> {
        self.rx.await.unwrap_or(Err(KvError::Closed))
    }
}

impl StoreHandle {
    /// Moves `backend` onto a worker task.
    ///
    /// Must be called from within a Tokio runtime. The worker stops once every
    /// handle clone has been dropped and the queue is drained.
    pub fn spawn(backend: impl KvBackend) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(backend, rx));
        Self { tx }
    }

    /// Reads one key. The read is ordered after every request issued before it.
    pub fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = KvResult<Option<Value>>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Request::Get {
            key: key.to_string(),
            reply,
        });
        async move { rx.await.unwrap_or(Err(KvError::Closed)) }
    }

    /// Reads and decodes one key.
    pub fn get_json<T: DeserializeOwned + Send + 'static>(
        &self,
        key: &str,
    ) -> impl Future<Output = KvResult<Option<T>>> + Send + 'static {
        let pending = self.get(key);
        async move {
            match pending.await? {
                Some(value) => Ok(Some(serde_json::from_value(value)?)),
                None => Ok(None),
            }
        }
    }

    /// Queues a write of `value` under `key`.
    pub fn set(&self, key: impl Into<String>, value: Value) -> PendingWrite {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Request::Set {
            key: key.into(),
            value,
            reply,
        });
        PendingWrite { rx }
    }

    /// Encodes `value` and queues the write.
    pub fn set_json<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> PendingWrite {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value),
            Err(err) => PendingWrite::ready(Err(KvError::Serialization(err))),
        }
    }

    /// Queues removal of `key`. Removing a missing key succeeds.
    pub fn remove(&self, key: impl Into<String>) -> PendingWrite {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Request::Remove {
            key: key.into(),
            reply,
        });
        PendingWrite { rx }
    }

    /// Resolves once every request issued before this call has been applied.
    pub fn barrier(&self) -> impl Future<Output = ()> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Request::Barrier { reply });
        async move {
            let _ = rx.await;
        }
    }
}

async fn run_worker<B: KvBackend>(backend: B, mut rx: mpsc::UnboundedReceiver<Request>) {
    info!("event=kv_worker module=kv status=start");
    while let Some(request) = rx.recv().await {
        // Backend calls are short local I/O and run inline on the worker.
        match request {
            Request::Get { key, reply } => {
                let started_at = Instant::now();
                let result = backend.get(&key);
                log_result("get", &key, started_at, &result);
                let _ = reply.send(result);
            }
            Request::Set { key, value, reply } => {
                let started_at = Instant::now();
                let result = backend.set(&key, &value);
                log_result("set", &key, started_at, &result);
                let _ = reply.send(result);
            }
            Request::Remove { key, reply } => {
                let started_at = Instant::now();
                let result = backend.remove(&key);
                log_result("remove", &key, started_at, &result);
                let _ = reply.send(result);
            }
            Request::Barrier { reply } => {
                let _ = reply.send(());
            }
        }
    }
    info!("event=kv_worker module=kv status=stopped");
}

fn log_result<T>(op: &str, key: &str, started_at: Instant, result: &KvResult<T>) {
    match result {
        Ok(_) => debug!(
            "event=kv_{} module=kv status=ok key={} duration_ms={}",
            op,
            key,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=kv_{} module=kv status=error key={} duration_ms={} error={}",
            op,
            key,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
