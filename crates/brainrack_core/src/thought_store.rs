//! Per-workspace thought collection with debounced persistence.
//!
//! # Responsibility
//! - Hold the in-memory thoughts of the open workspace.
//! - Load them from, and debounce-save them to, the durable store.
//! - Publish `thoughts` and `is_saving` as observable fields.
//!
//! # Invariants
//! - Re-scoping clears memory and bumps the load generation before the new
//!   load is issued; a load from an older generation is discarded.
//! - Nothing is persisted before the current scope finished loading.
//! - A debounced save writes the state current when the timer fires.
//! - `is_saving` is cleared only by the newest save request.
//!
//! Every method that may schedule a save must run inside a Tokio runtime.

use crate::kv::{KvError, StoreHandle};
use crate::model::thought::{Thought, ThoughtId};
use crate::model::workspace::{thoughts_key, WorkspaceId};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of one `load` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Stored thoughts were applied; `gap` counts thoughts created while the
    /// load was in flight and kept after the stored ones.
    Loaded { stored: usize, gap: usize },
    /// Reading failed; the store continues in memory.
    Failed,
    /// The store was re-scoped before the load finished.
    Stale,
}

/// Cloneable handle to one thought collection.
#[derive(Clone)]
pub struct ThoughtStore {
    inner: Arc<Inner>,
}

struct Inner {
    store: StoreHandle,
    debounce: Duration,
    thoughts: watch::Sender<Vec<Thought>>,
    saving: watch::Sender<bool>,
    scope: Mutex<Scope>,
}

#[derive(Default)]
struct Scope {
    thoughts: Vec<Thought>,
    workspace_id: Option<WorkspaceId>,
    generation: u64,
    synced: bool,
    timer_seq: u64,
    pending_save: Option<(u64, JoinHandle<()>)>,
    latest_save_id: u64,
}

impl Scope {
    fn cancel_pending_save(&mut self) {
        if let Some((_, handle)) = self.pending_save.take() {
            handle.abort();
        }
    }

    fn can_persist(&self) -> Option<WorkspaceId> {
        if self.synced {
            self.workspace_id
        } else {
            None
        }
    }
}

impl ThoughtStore {
    /// Creates an unscoped store writing through `store`.
    pub fn new(store: StoreHandle, debounce: Duration) -> Self {
        let (thoughts, _) = watch::channel(Vec::new());
        let (saving, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                debounce,
                thoughts,
                saving,
                scope: Mutex::new(Scope::default()),
            }),
        }
    }

    /// Scopes the store to `workspace_id` and loads its thoughts.
    ///
    /// The reset happens synchronously; only the read is deferred to the
    /// returned future.
    pub fn load(
        &self,
        workspace_id: WorkspaceId,
    ) -> impl Future<Output = LoadOutcome> + Send + 'static {
        let generation = {
            let mut scope = self.inner.lock_scope();
            scope.cancel_pending_save();
            scope.workspace_id = Some(workspace_id);
            scope.generation += 1;
            scope.synced = false;
            scope.thoughts.clear();
            self.inner.publish(&scope);
            scope.generation
        };
        debug!(
            "event=thoughts_load module=thought_store status=start workspace_id={} generation={}",
            workspace_id, generation
        );

        let pending = self.inner.store.get(&thoughts_key(workspace_id));
        let inner = Arc::clone(&self.inner);
        async move {
            let result = pending.await;
            let stored = match result {
                Ok(Some(value)) => Ok(decode_thoughts(workspace_id, value)),
                Ok(None) => Ok(Vec::new()),
                Err(err) => Err(err),
            };
            inner.finish_load(workspace_id, generation, stored)
        }
    }

    /// Unscopes the store, dropping memory and the pending debounce timer.
    ///
    /// Writes that were already issued still complete.
    pub fn close(&self) {
        let mut scope = self.inner.lock_scope();
        scope.cancel_pending_save();
        if let Some(workspace_id) = scope.workspace_id.take() {
            debug!(
                "event=thoughts_close module=thought_store status=ok workspace_id={}",
                workspace_id
            );
        }
        scope.generation += 1;
        scope.synced = false;
        scope.thoughts.clear();
        self.inner.publish(&scope);
    }

    /// Replaces the collection. Schedules a debounced save once synced.
    pub fn mutate(&self, next: Vec<Thought>) {
        self.modify(|thoughts| *thoughts = next);
    }

    /// Edits the collection in place. Schedules a debounced save once synced.
    ///
    /// `edit` runs under the store lock and must not call back into the store.
    pub fn modify<R>(&self, edit: impl FnOnce(&mut Vec<Thought>) -> R) -> R {
        let mut scope = self.inner.lock_scope();
        let result = edit(&mut scope.thoughts);
        self.inner.publish(&scope);
        if scope.can_persist().is_some() {
            self.inner.schedule_save(&mut scope);
        }
        result
    }

    /// Edits the collection and persists it immediately.
    pub fn modify_now<R>(&self, edit: impl FnOnce(&mut Vec<Thought>) -> R) -> R {
        let result = {
            let mut scope = self.inner.lock_scope();
            let result = edit(&mut scope.thoughts);
            self.inner.publish(&scope);
            result
        };
        self.save_now(None);
        result
    }

    /// Cancels the pending timer and persists `state` (or the current
    /// collection) right away.
    ///
    /// Returns `false` when nothing was written because the store is unscoped
    /// or still loading.
    pub fn save_now(&self, state: Option<Vec<Thought>>) -> bool {
        let mut scope = self.inner.lock_scope();
        scope.cancel_pending_save();
        let Some(workspace_id) = scope.can_persist() else {
            warn!(
                "event=thoughts_save module=thought_store status=skipped reason=not_synced workspace_id={:?}",
                scope.workspace_id
            );
            return false;
        };
        let payload = state.unwrap_or_else(|| scope.thoughts.clone());
        self.inner.persist(&mut scope, workspace_id, payload);
        true
    }

    /// Forces a pending debounced save and waits until every write issued so
    /// far has reached the backend.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        let has_pending = self.inner.lock_scope().pending_save.is_some();
        if has_pending {
            self.save_now(None);
        }
        let barrier = self.inner.store.barrier();
        async move {
            barrier.await;
            // Let save completion handlers observe their results.
            tokio::task::yield_now().await;
        }
    }

    pub fn thoughts(&self) -> Vec<Thought> {
        self.inner.thoughts.borrow().clone()
    }

    pub fn get(&self, id: ThoughtId) -> Option<Thought> {
        self.inner
            .thoughts
            .borrow()
            .iter()
            .find(|thought| thought.id == id)
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Thought>> {
        self.inner.thoughts.subscribe()
    }

    pub fn is_saving(&self) -> bool {
        *self.inner.saving.borrow()
    }

    pub fn subscribe_saving(&self) -> watch::Receiver<bool> {
        self.inner.saving.subscribe()
    }

    pub fn workspace_id(&self) -> Option<WorkspaceId> {
        self.inner.lock_scope().workspace_id
    }

    /// Whether the current scope finished loading.
    pub fn is_synced(&self) -> bool {
        self.inner.lock_scope().synced
    }

    pub fn has_pending_save(&self) -> bool {
        self.inner.lock_scope().pending_save.is_some()
    }
}

impl Inner {
    fn lock_scope(&self) -> MutexGuard<'_, Scope> {
        self.scope
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, scope: &Scope) {
        self.thoughts.send_replace(scope.thoughts.clone());
    }

    fn finish_load(
        self: &Arc<Self>,
        workspace_id: WorkspaceId,
        generation: u64,
        stored: Result<Vec<Thought>, KvError>,
    ) -> LoadOutcome {
        let mut scope = self.lock_scope();
        if scope.generation != generation || scope.workspace_id != Some(workspace_id) {
            debug!(
                "event=thoughts_load module=thought_store status=stale workspace_id={} generation={} current_generation={}",
                workspace_id, generation, scope.generation
            );
            return LoadOutcome::Stale;
        }

        let stored = match stored {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    "event=thoughts_load module=thought_store status=error workspace_id={} error={}",
                    workspace_id, err
                );
                scope.synced = true;
                return LoadOutcome::Failed;
            }
        };

        let stored_count = stored.len();
        let stored_ids: HashSet<ThoughtId> = stored.iter().map(|thought| thought.id).collect();
        let unsaved: Vec<Thought> = scope
            .thoughts
            .drain(..)
            .filter(|thought| !stored_ids.contains(&thought.id))
            .collect();
        let gap = unsaved.len();
        scope.thoughts = stored;
        scope.thoughts.extend(unsaved);
        scope.synced = true;
        self.publish(&scope);
        if gap > 0 {
            self.schedule_save(&mut scope);
        }

        info!(
            "event=thoughts_load module=thought_store status=ok workspace_id={} stored={} gap={}",
            workspace_id, stored_count, gap
        );
        LoadOutcome::Loaded {
            stored: stored_count,
            gap,
        }
    }

    fn schedule_save(self: &Arc<Self>, scope: &mut Scope) {
        scope.cancel_pending_save();
        let Some(workspace_id) = scope.can_persist() else {
            return;
        };
        scope.timer_seq += 1;
        let timer_id = scope.timer_seq;
        let delay = self.debounce;
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire_debounced(workspace_id, timer_id);
        });
        scope.pending_save = Some((timer_id, handle));
    }

    fn fire_debounced(self: &Arc<Self>, workspace_id: WorkspaceId, timer_id: u64) {
        let mut scope = self.lock_scope();
        match &scope.pending_save {
            Some((current, _)) if *current == timer_id => {}
            _ => return,
        }
        // Own handle: dropping it only detaches this running task.
        scope.pending_save = None;
        if scope.can_persist() != Some(workspace_id) {
            return;
        }
        let payload = scope.thoughts.clone();
        self.persist(&mut scope, workspace_id, payload);
    }

    fn persist(
        self: &Arc<Self>,
        scope: &mut Scope,
        workspace_id: WorkspaceId,
        payload: Vec<Thought>,
    ) {
        scope.latest_save_id += 1;
        let request_id = scope.latest_save_id;
        self.saving.send_replace(true);

        let count = payload.len();
        let pending = self.store.set_json(thoughts_key(workspace_id), &payload);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match pending.wait().await {
                Ok(()) => debug!(
                    "event=thoughts_save module=thought_store status=ok workspace_id={} request_id={} count={}",
                    workspace_id, request_id, count
                ),
                Err(err) => warn!(
                    "event=thoughts_save module=thought_store status=error workspace_id={} request_id={} error={}",
                    workspace_id, request_id, err
                ),
            }
            let scope = inner.lock_scope();
            if scope.latest_save_id == request_id {
                inner.saving.send_replace(false);
            }
        });
    }
}

/// Decodes a stored collection, dropping records that fail validation.
fn decode_thoughts(workspace_id: WorkspaceId, value: Value) -> Vec<Thought> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            warn!(
                "event=thoughts_decode module=thought_store status=error workspace_id={} error_code=not_an_array kind={}",
                workspace_id,
                json_kind(&other)
            );
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut thoughts = Vec::with_capacity(items.len());
    for item in items {
        let thought = match serde_json::from_value::<Thought>(item) {
            Ok(thought) => thought,
            Err(err) => {
                warn!(
                    "event=thoughts_decode module=thought_store status=error workspace_id={} error_code=invalid_record error={}",
                    workspace_id, err
                );
                continue;
            }
        };
        if let Err(err) = thought.validate() {
            warn!(
                "event=thoughts_decode module=thought_store status=error workspace_id={} error_code=invalid_record error={}",
                workspace_id, err
            );
            continue;
        }
        if seen.insert(thought.id) {
            thoughts.push(thought);
        }
    }
    thoughts
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
