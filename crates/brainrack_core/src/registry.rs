//! Workspace registry: metadata list and active workspace pointer.
//!
//! # Responsibility
//! - Load the registry once and serve it from memory afterwards.
//! - Create, rename, open and delete workspaces.
//! - Persist the list and the active pointer under their own keys.
//!
//! # Invariants
//! - At most one record per id.
//! - The list is sorted descending by `last_opened_at` after every mutation.
//! - Mutations are refused until `load` has completed.
//! - A stored list that could not be read is never overwritten; single
//!   undecodable records are dropped on load.
//! - In-memory state changes before the durable write is issued, and writes
//!   are issued in call order.

use crate::clock::{Clock, MonotonicClock};
use crate::kv::{KvResult, StoreHandle, ACTIVE_WORKSPACE_KEY, WORKSPACES_KEY};
use crate::model::workspace::{
    normalize_name, sort_by_last_opened, thoughts_key, WorkspaceId, WorkspaceMeta,
};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
}

#[derive(Default)]
struct RegistryState {
    phase: LoadPhase,
    items: Vec<WorkspaceMeta>,
    active: Option<WorkspaceId>,
    /// Set when the stored list could not be read as an array.
    list_unreadable: bool,
}

struct Inner {
    store: StoreHandle,
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
    workspaces: watch::Sender<Vec<WorkspaceMeta>>,
    active: watch::Sender<Option<WorkspaceId>>,
}

/// Cloneable handle to the workspace registry.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    inner: Arc<Inner>,
}

impl WorkspaceRegistry {
    /// Creates an unloaded registry using the wall clock.
    pub fn new(store: StoreHandle) -> Self {
        Self::with_clock(store, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(store: StoreHandle, clock: Arc<dyn Clock>) -> Self {
        let (workspaces, _) = watch::channel(Vec::new());
        let (active, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                state: Mutex::new(RegistryState::default()),
                workspaces,
                active,
            }),
        }
    }

    /// Reads the list and the active pointer.
    ///
    /// Only the first call does any work. Records that fail to decode are
    /// dropped. When the list itself cannot be read the registry keeps
    /// working in memory but never writes the list back.
    pub fn load(&self) -> impl Future<Output = ()> + Send + 'static {
        let should_load = {
            let mut state = self.inner.lock_state();
            if state.phase == LoadPhase::Idle {
                state.phase = LoadPhase::Loading;
                true
            } else {
                warn!(
                    "event=registry_load module=registry status=skipped reason=already_{:?}",
                    state.phase
                );
                false
            }
        };

        let pending = should_load.then(|| {
            (
                self.inner.store.get(WORKSPACES_KEY),
                self.inner.store.get_json::<WorkspaceId>(ACTIVE_WORKSPACE_KEY),
            )
        });
        let inner = Arc::clone(&self.inner);
        async move {
            if let Some((items, active)) = pending {
                let items = items.await;
                let active = active.await;
                inner.finish_load(items, active);
            }
        }
    }

    /// Creates a workspace, makes it active and returns it.
    ///
    /// Returns `None` when the trimmed name is empty or the registry is not
    /// loaded.
    pub fn create(&self, name: &str) -> Option<WorkspaceMeta> {
        let name = normalize_name(name)?;
        let mut state = self.inner.ready_state("create")?;

        let created = WorkspaceMeta::new(name, self.inner.clock.now_ms());
        state.items.insert(0, created.clone());
        sort_by_last_opened(&mut state.items);
        self.inner.persist_list(&state);
        self.inner.persist_active(&mut state, Some(created.id));

        info!(
            "event=workspace_create module=registry status=ok workspace_id={} total={}",
            created.id,
            state.items.len()
        );
        Some(created)
    }

    /// Renames a workspace. Returns the updated record.
    pub fn rename(&self, id: WorkspaceId, name: &str) -> Option<WorkspaceMeta> {
        let name = normalize_name(name)?;
        let mut state = self.inner.ready_state("rename")?;
        let now = self.inner.clock.now_ms();

        let record = state.items.iter_mut().find(|item| item.id == id)?;
        record.name = name;
        record.updated_at = now;
        let updated = record.clone();

        sort_by_last_opened(&mut state.items);
        self.inner.persist_list(&state);
        info!("event=workspace_rename module=registry status=ok workspace_id={id}");
        Some(updated)
    }

    /// Marks a workspace as opened now and makes it active.
    pub fn open(&self, id: WorkspaceId) -> Option<WorkspaceMeta> {
        let mut state = self.inner.ready_state("open")?;
        let now = self.inner.clock.now_ms();

        let record = state.items.iter_mut().find(|item| item.id == id)?;
        record.last_opened_at = now;
        record.updated_at = now;
        let opened = record.clone();

        sort_by_last_opened(&mut state.items);
        self.inner.persist_list(&state);
        self.inner.persist_active(&mut state, Some(id));
        info!("event=workspace_open module=registry status=ok workspace_id={id}");
        Some(opened)
    }

    /// Deletes a workspace and its thought collection.
    ///
    /// The thought key is removed first and independently of the list write,
    /// so a failure there never keeps the record alive. Returns whether a
    /// record was removed.
    pub fn delete(&self, id: WorkspaceId) -> bool {
        let Some(mut state) = self.inner.ready_state("delete") else {
            return false;
        };

        let _ = self.inner.store.remove(thoughts_key(id));

        let before = state.items.len();
        state.items.retain(|item| item.id != id);
        let removed = state.items.len() != before;
        if removed {
            sort_by_last_opened(&mut state.items);
            self.inner.persist_list(&state);
        }
        if state.active == Some(id) {
            self.inner.persist_active(&mut state, None);
        }

        info!(
            "event=workspace_delete module=registry status=ok workspace_id={} removed={} total={}",
            id,
            removed,
            state.items.len()
        );
        removed
    }

    /// Points the active pointer at `id`, or clears it with `None`.
    ///
    /// Returns `false` for an unknown id.
    pub fn set_active(&self, id: Option<WorkspaceId>) -> bool {
        let Some(mut state) = self.inner.ready_state("set_active") else {
            return false;
        };
        if let Some(id) = id {
            if !state.items.iter().any(|item| item.id == id) {
                return false;
            }
        }
        self.inner.persist_active(&mut state, id);
        true
    }

    /// Resolves once every registry write issued so far has been applied.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.store.barrier()
    }

    pub fn workspaces(&self) -> Vec<WorkspaceMeta> {
        self.inner.workspaces.borrow().clone()
    }

    pub fn get(&self, id: WorkspaceId) -> Option<WorkspaceMeta> {
        self.inner
            .workspaces
            .borrow()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn has_workspaces(&self) -> bool {
        !self.inner.workspaces.borrow().is_empty()
    }

    pub fn active_workspace_id(&self) -> Option<WorkspaceId> {
        *self.inner.active.borrow()
    }

    /// `false` when the stored list was unreadable and list writes are held
    /// back for the rest of the session.
    pub fn is_list_writable(&self) -> bool {
        !self.inner.lock_state().list_unreadable
    }

    /// `true` until the first `load` has completed.
    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().phase != LoadPhase::Ready
    }

    pub fn subscribe_workspaces(&self) -> watch::Receiver<Vec<WorkspaceMeta>> {
        self.inner.workspaces.subscribe()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Option<WorkspaceId>> {
        self.inner.active.subscribe()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ready_state(&self, op: &str) -> Option<MutexGuard<'_, RegistryState>> {
        let state = self.lock_state();
        if state.phase == LoadPhase::Ready {
            Some(state)
        } else {
            warn!("event=workspace_{op} module=registry status=skipped reason=not_loaded");
            None
        }
    }

    fn finish_load(
        &self,
        items: KvResult<Option<Value>>,
        active: KvResult<Option<WorkspaceId>>,
    ) {
        let (items, list_unreadable) = match items {
            Ok(Some(value)) => match decode_workspaces(value) {
                Some(items) => (Some(items), false),
                None => (None, true),
            },
            Ok(None) => (None, false),
            Err(err) => {
                warn!(
                    "event=registry_load module=registry status=error key={} error={}",
                    WORKSPACES_KEY, err
                );
                (None, true)
            }
        };
        let active = active.unwrap_or_else(|err| {
            warn!(
                "event=registry_load module=registry status=error key={} error={}",
                ACTIVE_WORKSPACE_KEY, err
            );
            None
        });

        let mut seen = HashSet::new();
        let mut items: Vec<WorkspaceMeta> = items
            .unwrap_or_default()
            .into_iter()
            .filter(|item| seen.insert(item.id))
            .collect();
        sort_by_last_opened(&mut items);
        if let Some(latest) = items
            .iter()
            .map(|item| item.last_opened_at.max(item.updated_at))
            .max()
        {
            self.clock.observe(latest);
        }
        if let Some(active) = active {
            if !items.iter().any(|item| item.id == active) {
                warn!(
                    "event=registry_load module=registry status=warn reason=dangling_active workspace_id={}",
                    active
                );
            }
        }

        let mut state = self.lock_state();
        state.items = items;
        state.active = active;
        state.list_unreadable = list_unreadable;
        state.phase = LoadPhase::Ready;
        self.workspaces.send_replace(state.items.clone());
        self.active.send_replace(state.active);
        info!(
            "event=registry_load module=registry status=ok total={} has_active={} list_writable={}",
            state.items.len(),
            state.active.is_some(),
            !state.list_unreadable
        );
    }

    fn persist_list(&self, state: &RegistryState) {
        self.workspaces.send_replace(state.items.clone());
        if state.list_unreadable {
            warn!(
                "event=registry_persist module=registry status=skipped reason=list_unreadable key={}",
                WORKSPACES_KEY
            );
            return;
        }
        let _ = self.store.set_json(WORKSPACES_KEY, &state.items);
    }

    fn persist_active(&self, state: &mut RegistryState, active: Option<WorkspaceId>) {
        state.active = active;
        self.active.send_replace(active);
        let _ = match active {
            Some(id) => self.store.set_json(ACTIVE_WORKSPACE_KEY, &id),
            None => self.store.remove(ACTIVE_WORKSPACE_KEY),
        };
    }
}

/// Decodes the stored list record by record.
///
/// Returns `None` when the value is not an array at all.
fn decode_workspaces(value: Value) -> Option<Vec<WorkspaceMeta>> {
    let Value::Array(records) = value else {
        warn!(
            "event=registry_decode module=registry status=error error_code=not_an_array key={}",
            WORKSPACES_KEY
        );
        return None;
    };

    let mut items = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<WorkspaceMeta>(record) {
            Ok(item) if normalize_name(&item.name).is_some() => items.push(item),
            Ok(item) => warn!(
                "event=registry_decode module=registry status=error error_code=blank_name workspace_id={}",
                item.id
            ),
            Err(err) => warn!(
                "event=registry_decode module=registry status=error error_code=invalid_record error={}",
                err
            ),
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::decode_workspaces;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn decode_skips_bad_records_only() {
        let value = json!([
            {"id": Uuid::new_v4(), "name": "Good", "createdAt": 1, "updatedAt": 2, "lastOpenedAt": 3},
            {"id": Uuid::new_v4(), "name": "Legacy", "createdAt": 3},
            {"id": Uuid::new_v4(), "name": "  ", "createdAt": 1, "updatedAt": 1, "lastOpenedAt": 1},
            42
        ]);

        let items = decode_workspaces(value).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Good");
    }

    #[test]
    fn decode_rejects_non_array() {
        assert!(decode_workspaces(json!({"workspaces": []})).is_none());
    }
}
