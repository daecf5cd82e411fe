//! Workspace metadata model.
//!
//! # Responsibility
//! - Define the registry record describing one workspace.
//! - Provide the ordering helper shared by every registry mutation.
//!
//! # Invariants
//! - `name` is trimmed and non-empty.
//! - Timestamps are Unix epoch milliseconds and never move backwards.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use uuid::Uuid;

/// Stable identifier of one workspace.
pub type WorkspaceId = Uuid;

/// Registry record for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMeta {
    pub id: WorkspaceId,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_opened_at: i64,
}

impl WorkspaceMeta {
    /// Creates a record with all timestamps set to `now_ms`.
    pub fn new(name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now_ms,
            updated_at: now_ms,
            last_opened_at: now_ms,
        }
    }
}

/// Sorts most-recently-opened first. Stable for equal timestamps.
pub fn sort_by_last_opened(items: &mut [WorkspaceMeta]) {
    items.sort_by_key(|item| Reverse(item.last_opened_at));
}

/// Trims a display name; `None` when blank.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Durable key of one workspace's thought collection.
pub fn thoughts_key(id: WorkspaceId) -> String {
    format!("workspace:{id}:thoughts")
}
