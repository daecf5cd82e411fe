//! Thought domain model.
//!
//! # Responsibility
//! - Define the positioned text note rendered on the canvas.
//! - Provide text normalization shared by create and edit paths.
//!
//! # Invariants
//! - `id` is stable for the lifetime of the thought.
//! - `text` is never blank while the thought exists.
//! - `x`/`y`/`rotation` are finite numbers.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one thought.
pub type ThoughtId = Uuid;

/// One positioned text note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub id: ThoughtId,
    pub text: String,
    /// Canvas x coordinate, top-left origin.
    pub x: f64,
    /// Canvas y coordinate, top-left origin.
    pub y: f64,
    /// Degrees. Cosmetic only.
    pub rotation: f64,
}

/// Validation failures for persisted or caller-built thoughts.
#[derive(Debug, Clone, PartialEq)]
pub enum ThoughtValidationError {
    BlankText(ThoughtId),
    NonFiniteGeometry(ThoughtId),
}

impl Display for ThoughtValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankText(id) => write!(f, "thought {id} has blank text"),
            Self::NonFiniteGeometry(id) => {
                write!(f, "thought {id} has non-finite position or rotation")
            }
        }
    }
}

impl Error for ThoughtValidationError {}

impl Thought {
    /// Creates a thought with a generated id.
    pub fn new(text: impl Into<String>, x: f64, y: f64, rotation: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            x,
            y,
            rotation,
        }
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), ThoughtValidationError> {
        if self.text.trim().is_empty() {
            return Err(ThoughtValidationError::BlankText(self.id));
        }
        if !(self.x.is_finite() && self.y.is_finite() && self.rotation.is_finite()) {
            return Err(ThoughtValidationError::NonFiniteGeometry(self.id));
        }
        Ok(())
    }
}

/// Trims `text` and caps it at `max_chars` Unicode scalar values.
///
/// Returns `None` when nothing is left after trimming.
pub fn normalize_text(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let capped: String = trimmed.chars().take(max_chars).collect();
    (!capped.is_empty()).then_some(capped)
}
