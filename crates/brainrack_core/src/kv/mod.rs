//! Durable key-value store used by the registry and thought stores.
//!
//! # Responsibility
//! - Define the synchronous backend contract (`KvBackend`).
//! - Provide SQLite and in-memory backends.
//! - Expose the asynchronous, order-preserving face (`StoreHandle`).
//!
//! # Invariants
//! - Requests are applied in the order they were issued, across all keys.
//! - Values are JSON documents; callers never see raw SQL rows.

use crate::db::DbError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod handle;
mod memory;
mod sqlite;

pub use handle::{PendingWrite, StoreHandle};
pub use memory::MemoryKvBackend;
pub use sqlite::SqliteKvBackend;

/// Registry list key.
pub const WORKSPACES_KEY: &str = "workspaces";
/// Active workspace pointer key.
pub const ACTIVE_WORKSPACE_KEY: &str = "workspace:active";

pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by key-value operations.
#[derive(Debug)]
pub enum KvError {
    Db(DbError),
    Serialization(serde_json::Error),
    /// Backend-specific failure without a richer error type.
    Backend(String),
    /// The store worker is gone; the request was never applied.
    Closed,
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "invalid stored value: {err}"),
            Self::Backend(message) => write!(f, "store backend failure: {message}"),
            Self::Closed => write!(f, "store worker is closed"),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Backend(_) | Self::Closed => None,
        }
    }
}

impl From<DbError> for KvError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for KvError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Synchronous storage contract driven by the store worker.
///
/// Implementations only see one request at a time.
pub trait KvBackend: Send + 'static {
    fn get(&self, key: &str) -> KvResult<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> KvResult<()>;
    fn remove(&self, key: &str) -> KvResult<()>;
}
