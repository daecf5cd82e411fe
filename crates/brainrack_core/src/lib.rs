//! Core state engine for the Brainrack thought canvas.
//! This crate owns every invariant: workspace registry, per-workspace thought
//! persistence, canvas operations and drag collision decisions.

pub mod canvas;
pub mod clock;
pub mod collision;
pub mod config;
pub mod db;
pub mod kv;
pub mod logging;
pub mod model;
pub mod registry;
pub mod session;
pub mod thought_store;

pub use canvas::{spawn_placement, CanvasEngine, Placement, Viewport, MERGE_SEPARATOR};
pub use clock::{Clock, MonotonicClock};
pub use collision::{DragOutcome, DragSession, Rect};
pub use config::{CanvasConfig, ConfigError};
pub use kv::{
    KvBackend, KvError, KvResult, MemoryKvBackend, PendingWrite, SqliteKvBackend, StoreHandle,
    ACTIVE_WORKSPACE_KEY, WORKSPACES_KEY,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::thought::{normalize_text, Thought, ThoughtId, ThoughtValidationError};
pub use model::workspace::{thoughts_key, WorkspaceId, WorkspaceMeta};
pub use registry::WorkspaceRegistry;
pub use session::CanvasSession;
pub use thought_store::{LoadOutcome, ThoughtStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
