//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose workspace, thought and drag use cases to Dart via FRB.
//! - Own the process-wide runtime and canvas session behind those calls.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every call except `ping`, `core_version` and `init_logging` requires a
//!   prior successful `init_session`.
//! - Ids cross the boundary as hyphenated UUID strings.

use brainrack_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CanvasConfig, CanvasSession, DragOutcome, DragSession, LoadOutcome, Rect, Thought, Viewport,
    WorkspaceMeta,
};
use log::{info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

const DEFAULT_DB_FILE_NAME: &str = "brainrack.sqlite3";
const DB_PATH_ENV: &str = "BRAINRACK_DB_PATH";

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static SESSION: Mutex<Option<CanvasSession>> = Mutex::new(None);
static DRAG: Mutex<Option<DragSession>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Workspace record as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceItem {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_opened_at: i64,
}

/// Thought as seen by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtItem {
    pub id: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

/// Rendered box of one note, in canvas coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteBox {
    pub id: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceListResponse {
    /// Most recently opened first.
    pub items: Vec<WorkspaceItem>,
    pub active_id: Option<String>,
    pub message: String,
}

/// Result of one workspace command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceActionResponse {
    pub ok: bool,
    pub workspace: Option<WorkspaceItem>,
    pub message: String,
}

/// Thoughts of the open workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtListResponse {
    pub items: Vec<ThoughtItem>,
    /// `None` when no workspace is open.
    pub workspace_id: Option<String>,
    pub is_saving: bool,
    pub message: String,
}

/// Result of one thought command.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtActionResponse {
    pub ok: bool,
    pub thought: Option<ThoughtItem>,
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    fn from_result(op: &str, result: Result<bool, String>, done: &str, skipped: &str) -> Self {
        match result {
            Ok(true) => Self::success(done),
            Ok(false) => Self::failure(format!("{op}: {skipped}")),
            Err(err) => Self::failure(format!("{op} failed: {err}")),
        }
    }
}

/// Live drag feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragProgressResponse {
    /// Note that would receive a merge if the drag ended now.
    pub candidate_id: Option<String>,
    pub message: String,
}

/// Opens the canvas database and restores the last active workspace.
///
/// Input semantics:
/// - `db_path`: database file; blank falls back to `BRAINRACK_DB_PATH`, then
///   a file in the system temp directory.
/// - `config_path`: optional TOML file with canvas settings.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Calling again replaces the session after flushing the previous one.
#[flutter_rust_bridge::frb(sync)]
pub fn init_session(db_path: String, config_path: Option<String>) -> ActionResponse {
    match open_session(&db_path, config_path.as_deref()) {
        Ok(path) => ActionResponse::success(format!("Session opened at {}.", path.display())),
        Err(err) => ActionResponse::failure(format!("init_session failed: {err}")),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn workspace_list() -> WorkspaceListResponse {
    match with_session(|session| {
        (
            session.registry().workspaces(),
            session.registry().active_workspace_id(),
        )
    }) {
        Ok((items, active)) => WorkspaceListResponse {
            message: format!("{} workspace(s).", items.len()),
            items: items.iter().map(to_workspace_item).collect(),
            active_id: active.map(|id| id.to_string()),
        },
        Err(err) => WorkspaceListResponse {
            items: Vec::new(),
            active_id: None,
            message: format!("workspace_list failed: {err}"),
        },
    }
}

/// Creates a workspace and opens it.
#[flutter_rust_bridge::frb(sync)]
pub fn workspace_create(name: String) -> WorkspaceActionResponse {
    let result = block_on_session(|session| async move { session.create_workspace(&name).await });
    workspace_response("workspace_create", result, "Workspace created.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn workspace_rename(id: String, name: String) -> WorkspaceActionResponse {
    let result = parse_id(&id)
        .and_then(|id| with_session(|session| session.rename_workspace(id, &name)));
    workspace_response("workspace_rename", result, "Workspace renamed.")
}

/// Opens a workspace and loads its thoughts before returning.
#[flutter_rust_bridge::frb(sync)]
pub fn workspace_open(id: String) -> WorkspaceActionResponse {
    let result = parse_id(&id).and_then(|id| {
        clear_drag();
        block_on_session(|session| async move { session.open_workspace(id).await })
    });
    match result {
        Ok(Some((meta, outcome))) => WorkspaceActionResponse {
            ok: true,
            workspace: Some(to_workspace_item(&meta)),
            message: load_message(outcome),
        },
        Ok(None) => WorkspaceActionResponse {
            ok: false,
            workspace: None,
            message: "workspace_open: unknown workspace".to_string(),
        },
        Err(err) => WorkspaceActionResponse {
            ok: false,
            workspace: None,
            message: format!("workspace_open failed: {err}"),
        },
    }
}

/// Deletes a workspace together with its thoughts.
#[flutter_rust_bridge::frb(sync)]
pub fn workspace_delete(id: String) -> ActionResponse {
    let result = parse_id(&id).and_then(|id| {
        clear_drag();
        with_session(|session| session.delete_workspace(id))
    });
    ActionResponse::from_result(
        "workspace_delete",
        result,
        "Workspace deleted.",
        "unknown workspace",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn thought_list() -> ThoughtListResponse {
    match with_session(|session| {
        let store = session.canvas().store();
        (store.thoughts(), store.workspace_id(), store.is_saving())
    }) {
        Ok((items, workspace_id, is_saving)) => ThoughtListResponse {
            message: format!("{} thought(s).", items.len()),
            items: items.iter().map(to_thought_item).collect(),
            workspace_id: workspace_id.map(|id| id.to_string()),
            is_saving,
        },
        Err(err) => ThoughtListResponse {
            items: Vec::new(),
            workspace_id: None,
            is_saving: false,
            message: format!("thought_list failed: {err}"),
        },
    }
}

/// Adds a thought at a random spot of the given viewport.
///
/// Input semantics:
/// - `viewport_width` / `viewport_height`: `None` while the canvas has not
///   been measured; the call is then a no-op.
#[flutter_rust_bridge::frb(sync)]
pub fn thought_add(
    text: String,
    viewport_width: Option<f64>,
    viewport_height: Option<f64>,
) -> ThoughtActionResponse {
    let viewport = viewport_width
        .zip(viewport_height)
        .map(|(width, height)| Viewport::new(width, height));
    match with_session(|session| session.canvas().add_thought(&text, viewport)) {
        Ok(Some(thought)) => ThoughtActionResponse {
            ok: true,
            thought: Some(to_thought_item(&thought)),
            message: "Thought added.".to_string(),
        },
        Ok(None) => ThoughtActionResponse {
            ok: false,
            thought: None,
            message: "thought_add: blank text or unmeasured canvas".to_string(),
        },
        Err(err) => ThoughtActionResponse {
            ok: false,
            thought: None,
            message: format!("thought_add failed: {err}"),
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn thought_update(id: String, text: String) -> ActionResponse {
    let result = parse_id(&id)
        .and_then(|id| with_session(|session| session.canvas().update_thought(id, &text)));
    ActionResponse::from_result(
        "thought_update",
        result,
        "Thought updated.",
        "blank text or unknown thought",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn thought_delete(id: String) -> ActionResponse {
    let result =
        parse_id(&id).and_then(|id| with_session(|session| session.canvas().delete_thought(id)));
    ActionResponse::from_result(
        "thought_delete",
        result,
        "Thought deleted.",
        "unknown thought",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn thoughts_clear() -> ActionResponse {
    match with_session(|session| session.canvas().clear_all()) {
        Ok(()) => ActionResponse::success("Canvas cleared."),
        Err(err) => ActionResponse::failure(format!("thoughts_clear failed: {err}")),
    }
}

/// Starts dragging `id`; `siblings` are the currently rendered note boxes.
///
/// Replaces a drag that was never ended.
#[flutter_rust_bridge::frb(sync)]
pub fn drag_begin(id: String, siblings: Vec<NoteBox>) -> ActionResponse {
    let result = parse_id(&id).and_then(|id| {
        let boxes = siblings
            .iter()
            .map(note_box_to_rect)
            .collect::<Result<Vec<_>, _>>()?;
        with_session(|session| session.canvas().begin_drag(id, boxes))
    });
    match result {
        Ok(Some(drag)) => {
            *lock(&DRAG) = Some(drag);
            ActionResponse::success("Drag started.")
        }
        Ok(None) => ActionResponse::failure("drag_begin: unknown thought"),
        Err(err) => ActionResponse::failure(format!("drag_begin failed: {err}")),
    }
}

/// Reports the merge candidate under the dragged note's current box.
#[flutter_rust_bridge::frb(sync)]
pub fn drag_progress(current: NoteBox) -> DragProgressResponse {
    let rect = match note_box_to_rect(&current) {
        Ok((_, rect)) => rect,
        Err(err) => {
            return DragProgressResponse {
                candidate_id: None,
                message: format!("drag_progress failed: {err}"),
            }
        }
    };
    match lock(&DRAG).as_ref() {
        Some(drag) => DragProgressResponse {
            candidate_id: drag.candidate(&rect).map(|id| id.to_string()),
            message: String::new(),
        },
        None => DragProgressResponse {
            candidate_id: None,
            message: "drag_progress: no active drag".to_string(),
        },
    }
}

/// Ends the drag: merges into the candidate or moves by `(offset_x, offset_y)`.
#[flutter_rust_bridge::frb(sync)]
pub fn drag_end(current: NoteBox, offset_x: f64, offset_y: f64) -> ActionResponse {
    let Some(drag) = lock(&DRAG).take() else {
        return ActionResponse::failure("drag_end: no active drag");
    };
    let rect = match note_box_to_rect(&current) {
        Ok((_, rect)) => rect,
        Err(err) => return ActionResponse::failure(format!("drag_end failed: {err}")),
    };
    let outcome = drag.finish(&rect, (offset_x, offset_y));
    let done = match outcome {
        DragOutcome::Merge { .. } => "Thoughts merged.",
        DragOutcome::Move { .. } => "Thought moved.",
    };
    let result = with_session(|session| session.canvas().apply_drag(outcome));
    ActionResponse::from_result("drag_end", result, done, "thought no longer exists")
}

/// Writes pending saves and waits for every issued write.
#[flutter_rust_bridge::frb(sync)]
pub fn flush() -> ActionResponse {
    match block_on_session(|session| async move { session.flush().await }) {
        Ok(()) => ActionResponse::success("Flushed."),
        Err(err) => ActionResponse::failure(format!("flush failed: {err}")),
    }
}

fn runtime() -> Result<&'static Runtime, String> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let built = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("brainrack-core")
        .enable_time()
        .build()
        .map_err(|err| format!("runtime start failed: {err}"))?;
    // A concurrent initializer may win; its runtime is used instead.
    let _ = RUNTIME.set(built);
    RUNTIME
        .get()
        .ok_or_else(|| "runtime unavailable".to_string())
}

fn open_session(db_path: &str, config_path: Option<&str>) -> Result<PathBuf, String> {
    let path = resolve_db_path(db_path);
    let config = match config_path.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => CanvasConfig::load_or_default(raw).map_err(|err| err.to_string())?,
        None => CanvasConfig::default(),
    };
    let runtime = runtime()?;

    let previous = lock(&SESSION).take();
    clear_drag();
    let session = runtime.block_on(async {
        if let Some(previous) = previous {
            previous.flush().await;
        }
        let session = CanvasSession::open_sqlite(&path, config).map_err(|err| err.to_string())?;
        session.load().await;
        Ok::<_, String>(session)
    })?;

    *lock(&SESSION) = Some(session);
    info!(
        "event=session_init module=ffi status=ok db_path={}",
        path.display()
    );
    Ok(path)
}

fn resolve_db_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        return PathBuf::from(trimmed);
    }
    if let Ok(env_path) = std::env::var(DB_PATH_ENV) {
        let env_trimmed = env_path.trim();
        if !env_trimmed.is_empty() {
            return PathBuf::from(env_trimmed);
        }
    }
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

fn current_session() -> Result<CanvasSession, String> {
    lock(&SESSION)
        .clone()
        .ok_or_else(|| "session not initialized".to_string())
}

/// Runs a sync session call inside the runtime context, which debounce
/// timers and save completions need.
fn with_session<T>(f: impl FnOnce(&CanvasSession) -> T) -> Result<T, String> {
    let runtime = runtime()?;
    let session = current_session()?;
    let _guard = runtime.enter();
    Ok(f(&session))
}

fn block_on_session<F, Fut>(f: F) -> Result<Fut::Output, String>
where
    F: FnOnce(CanvasSession) -> Fut,
    Fut: Future,
{
    let runtime = runtime()?;
    let session = current_session()?;
    Ok(runtime.block_on(f(session)))
}

fn clear_drag() {
    lock(&DRAG).take();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|err| {
        warn!("event=ffi_parse_id module=ffi status=error error={err}");
        format!("invalid id `{}`: {err}", raw.trim())
    })
}

fn note_box_to_rect(note: &NoteBox) -> Result<(Uuid, Rect), String> {
    let id = parse_id(&note.id)?;
    Ok((
        id,
        Rect::from_origin_size(note.left, note.top, note.width, note.height),
    ))
}

fn workspace_response(
    op: &str,
    result: Result<Option<WorkspaceMeta>, String>,
    done: &str,
) -> WorkspaceActionResponse {
    match result {
        Ok(Some(meta)) => WorkspaceActionResponse {
            ok: true,
            workspace: Some(to_workspace_item(&meta)),
            message: done.to_string(),
        },
        Ok(None) => WorkspaceActionResponse {
            ok: false,
            workspace: None,
            message: format!("{op}: blank name or unknown workspace"),
        },
        Err(err) => WorkspaceActionResponse {
            ok: false,
            workspace: None,
            message: format!("{op} failed: {err}"),
        },
    }
}

fn load_message(outcome: LoadOutcome) -> String {
    match outcome {
        LoadOutcome::Loaded { stored, .. } => format!("Workspace opened with {stored} thought(s)."),
        LoadOutcome::Failed => "Workspace opened; stored thoughts could not be read.".to_string(),
        LoadOutcome::Stale => "Workspace opened; a newer open superseded this load.".to_string(),
    }
}

fn to_workspace_item(meta: &WorkspaceMeta) -> WorkspaceItem {
    WorkspaceItem {
        id: meta.id.to_string(),
        name: meta.name.clone(),
        created_at: meta.created_at,
        updated_at: meta.updated_at,
        last_opened_at: meta.last_opened_at,
    }
}

fn to_thought_item(thought: &Thought) -> ThoughtItem {
    ThoughtItem {
        id: thought.id.to_string(),
        text: thought.text.clone(),
        x: thought.x,
        y: thought.y,
        rotation: thought.rotation,
    }
}
