//! Domain model for the thought canvas.
//!
//! # Responsibility
//! - Define the records persisted per workspace and in the registry.
//! - Keep field naming stable for the stored JSON shape.
//!
//! # Invariants
//! - Every record is identified by a UUID that is never reused.
//! - A thought belongs to exactly one workspace collection.

pub mod thought;
pub mod workspace;
