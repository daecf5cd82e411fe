//! Session context tying the registry to the open canvas.
//!
//! # Responsibility
//! - Own one registry and one canvas engine over a shared store worker.
//! - Sequence operations that touch both (open, create, delete).
//!
//! # Invariants
//! - The thought store is only ever scoped to a workspace in the registry.
//! - Deleting the open workspace closes its thought store before the thought
//!   key is removed, so no later debounced save can resurrect it.
//! - Switching to another workspace first writes out a pending debounced
//!   save of the one being left.

use crate::canvas::CanvasEngine;
use crate::clock::Clock;
use crate::config::CanvasConfig;
use crate::db::DbResult;
use crate::kv::{KvBackend, MemoryKvBackend, SqliteKvBackend, StoreHandle};
use crate::model::workspace::{WorkspaceId, WorkspaceMeta};
use crate::registry::WorkspaceRegistry;
use crate::thought_store::{LoadOutcome, ThoughtStore};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Everything one running canvas needs. Construct once per process (or per
/// test) and pass it to the presentation layer.
#[derive(Clone)]
pub struct CanvasSession {
    registry: WorkspaceRegistry,
    canvas: CanvasEngine,
}

impl CanvasSession {
    /// Builds a session over an already running store worker.
    pub fn new(store: StoreHandle, config: CanvasConfig) -> Self {
        let registry = WorkspaceRegistry::new(store.clone());
        Self::assemble(registry, store, config)
    }

    pub fn with_clock(store: StoreHandle, config: CanvasConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = WorkspaceRegistry::with_clock(store.clone(), clock);
        Self::assemble(registry, store, config)
    }

    /// Spawns a worker for `backend` and builds a session on it.
    pub fn with_backend(backend: impl KvBackend, config: CanvasConfig) -> Self {
        Self::new(StoreHandle::spawn(backend), config)
    }

    /// Opens (or creates) a SQLite database file for the session.
    pub fn open_sqlite(path: impl AsRef<Path>, config: CanvasConfig) -> DbResult<Self> {
        let backend = SqliteKvBackend::open(path)?;
        Ok(Self::with_backend(backend, config))
    }

    /// Session that keeps everything in memory.
    pub fn in_memory(config: CanvasConfig) -> Self {
        Self::with_backend(MemoryKvBackend::new(), config)
    }

    fn assemble(registry: WorkspaceRegistry, store: StoreHandle, config: CanvasConfig) -> Self {
        let thoughts = ThoughtStore::new(store, config.save_debounce());
        Self {
            registry,
            canvas: CanvasEngine::new(thoughts, config),
        }
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    pub fn canvas(&self) -> &CanvasEngine {
        &self.canvas
    }

    /// Loads the registry, then the active workspace's thoughts if the
    /// pointer refers to a known workspace.
    pub async fn load(&self) {
        self.registry.load().await;
        let restorable = self
            .registry
            .active_workspace_id()
            .filter(|id| self.registry.get(*id).is_some());
        if let Some(id) = restorable {
            let outcome = self.canvas.store().load(id).await;
            info!(
                "event=session_restore module=session status=ok workspace_id={} outcome={:?}",
                id, outcome
            );
        }
    }

    /// Creates a workspace and opens its (empty) canvas.
    pub async fn create_workspace(&self, name: &str) -> Option<WorkspaceMeta> {
        let created = self.registry.create(name)?;
        self.checkpoint_open_canvas();
        self.canvas.store().load(created.id).await;
        Some(created)
    }

    /// Opens a workspace and loads its thoughts.
    ///
    /// Returns `None` for an unknown id; the canvas is left untouched then.
    pub async fn open_workspace(&self, id: WorkspaceId) -> Option<(WorkspaceMeta, LoadOutcome)> {
        let opened = self.registry.open(id)?;
        self.checkpoint_open_canvas();
        let outcome = self.canvas.store().load(id).await;
        Some((opened, outcome))
    }

    pub fn rename_workspace(&self, id: WorkspaceId, name: &str) -> Option<WorkspaceMeta> {
        self.registry.rename(id, name)
    }

    /// Deletes a workspace, closing its canvas first when it is open.
    pub fn delete_workspace(&self, id: WorkspaceId) -> bool {
        if self.canvas.store().workspace_id() == Some(id) {
            self.canvas.store().close();
        }
        self.registry.delete(id)
    }

    /// Unmounts the canvas without touching the registry.
    pub fn close_workspace(&self) {
        self.checkpoint_open_canvas();
        self.canvas.store().close();
    }

    /// Forces pending saves and waits for every issued write.
    pub async fn flush(&self) {
        self.canvas.store().flush().await;
        self.registry.flush().await;
    }

    fn checkpoint_open_canvas(&self) {
        let store = self.canvas.store();
        if store.has_pending_save() {
            store.save_now(None);
        }
    }
}
