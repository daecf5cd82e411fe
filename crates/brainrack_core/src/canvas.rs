//! Canvas operations over the open workspace's thoughts.
//!
//! # Responsibility
//! - Normalize input text and pick spawn positions for new thoughts.
//! - Apply move, edit, merge, delete and clear to the thought store.
//! - Turn finished drags into merge or move operations.
//!
//! # Invariants
//! - Stored text is trimmed, non-empty and capped at `max_thought_length`
//!   (merged text is the only exception and is never truncated).
//! - Unknown ids are no-ops that leave the collection untouched.
//! - Drag completions (move, merge) are persisted immediately.

use crate::collision::{DragOutcome, DragSession, Rect};
use crate::config::CanvasConfig;
use crate::model::thought::{normalize_text, Thought, ThoughtId};
use crate::thought_store::ThoughtStore;
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::watch;

/// Separator placed between target and source text on merge.
pub const MERGE_SEPARATOR: &str = "\n\n";

/// Size of the visible canvas area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_measurable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite()
    }
}

/// Spawn placement for a new thought.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

/// Picks a random spot inside the free band of `viewport`.
///
/// `x` spans `[padding, width - note_width - padding]` and `y` spans
/// `[padding, height - input_guard_height]`; either range collapses to
/// `padding` when the viewport is smaller than its margins.
///
/// Total over any config: margins and rotation are read as magnitudes and
/// non-finite values count as zero.
pub fn spawn_placement<R: Rng>(
    config: &CanvasConfig,
    viewport: Viewport,
    rng: &mut R,
) -> Placement {
    let padding = magnitude(config.note_padding);
    let note_width = magnitude(config.note_width);
    let guard = magnitude(config.input_guard_height);
    let horizontal_space = (viewport.width - note_width - padding * 2.0).max(0.0);
    let vertical_space = (viewport.height - guard - padding).max(0.0);
    let max_rotation = magnitude(config.max_rotation_degrees);

    Placement {
        x: padding + rng.random::<f64>() * horizontal_space,
        y: padding + rng.random::<f64>() * vertical_space,
        rotation: rng.random_range(-max_rotation..=max_rotation),
    }
}

fn magnitude(value: f64) -> f64 {
    if value.is_finite() {
        value.abs()
    } else {
        0.0
    }
}

/// Operation surface the presentation layer drives.
#[derive(Clone)]
pub struct CanvasEngine {
    store: ThoughtStore,
    config: CanvasConfig,
}

impl CanvasEngine {
    pub fn new(store: ThoughtStore, config: CanvasConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!("event=canvas_config module=canvas status=warn error={err}");
        }
        Self { store, config }
    }

    pub fn store(&self) -> &ThoughtStore {
        &self.store
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn thoughts(&self) -> Vec<Thought> {
        self.store.thoughts()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Thought>> {
        self.store.subscribe()
    }

    /// Adds a thought at a random spawn position.
    ///
    /// Returns `None` when the text is blank or the viewport is unknown.
    pub fn add_thought(&self, text: &str, viewport: Option<Viewport>) -> Option<Thought> {
        self.add_thought_with_rng(text, viewport, &mut rand::rng())
    }

    /// `add_thought` with a caller-supplied random source.
    pub fn add_thought_with_rng<R: Rng>(
        &self,
        text: &str,
        viewport: Option<Viewport>,
        rng: &mut R,
    ) -> Option<Thought> {
        let text = normalize_text(text, self.config.max_thought_length)?;
        let viewport = viewport.filter(Viewport::is_measurable)?;
        let placement = spawn_placement(&self.config, viewport, rng);
        let thought = Thought::new(text, placement.x, placement.y, placement.rotation);

        let created = thought.clone();
        self.store.modify(|thoughts| thoughts.push(thought));
        info!(
            "event=thought_add module=canvas status=ok thought_id={} chars={}",
            created.id,
            created.text.chars().count()
        );
        Some(created)
    }

    /// Removes one thought. Returns `false` when the id is unknown.
    pub fn delete_thought(&self, id: ThoughtId) -> bool {
        if !self.contains(id) {
            debug!("event=thought_delete module=canvas status=skipped reason=not_found thought_id={id}");
            return false;
        }
        self.store
            .modify(|thoughts| thoughts.retain(|thought| thought.id != id));
        info!("event=thought_delete module=canvas status=ok thought_id={id}");
        true
    }

    /// Overwrites the position of one thought and saves immediately.
    pub fn move_thought(&self, id: ThoughtId, x: f64, y: f64) -> bool {
        if !self.contains(id) || !(x.is_finite() && y.is_finite()) {
            debug!("event=thought_move module=canvas status=skipped thought_id={id}");
            return false;
        }
        self.store.modify_now(|thoughts| {
            if let Some(thought) = thoughts.iter_mut().find(|thought| thought.id == id) {
                thought.x = x;
                thought.y = y;
            }
        });
        debug!("event=thought_move module=canvas status=ok thought_id={id}");
        true
    }

    /// Replaces the text of one thought through the debounced save path.
    ///
    /// The text is normalized like new input; blank text is ignored.
    pub fn update_thought(&self, id: ThoughtId, text: &str) -> bool {
        let Some(text) = normalize_text(text, self.config.max_thought_length) else {
            debug!("event=thought_update module=canvas status=skipped reason=blank thought_id={id}");
            return false;
        };
        if !self.contains(id) {
            debug!("event=thought_update module=canvas status=skipped reason=not_found thought_id={id}");
            return false;
        }
        self.store.modify(|thoughts| {
            if let Some(thought) = thoughts.iter_mut().find(|thought| thought.id == id) {
                thought.text = text;
            }
        });
        info!("event=thought_update module=canvas status=ok thought_id={id}");
        true
    }

    /// Appends `source` text to `target` and removes `source`.
    ///
    /// Returns the updated target, or `None` when either id is unknown or
    /// both ids are the same.
    pub fn merge_thoughts(&self, source_id: ThoughtId, target_id: ThoughtId) -> Option<Thought> {
        if source_id == target_id || !self.contains(source_id) || !self.contains(target_id) {
            debug!(
                "event=thought_merge module=canvas status=skipped source_id={} target_id={}",
                source_id, target_id
            );
            return None;
        }

        let merged = self.store.modify_now(|thoughts| {
            let source_index = thoughts.iter().position(|thought| thought.id == source_id)?;
            let mut target_index = thoughts.iter().position(|thought| thought.id == target_id)?;
            let source = thoughts.remove(source_index);
            if target_index > source_index {
                target_index -= 1;
            }
            let target = &mut thoughts[target_index];
            target.text = format!("{}{}{}", target.text, MERGE_SEPARATOR, source.text);
            Some(target.clone())
        });
        info!(
            "event=thought_merge module=canvas status=ok source_id={} target_id={}",
            source_id, target_id
        );
        merged
    }

    /// Removes every thought of the open workspace.
    pub fn clear_all(&self) {
        let removed = self.store.modify(|thoughts| {
            let count = thoughts.len();
            thoughts.clear();
            count
        });
        info!("event=thought_clear module=canvas status=ok removed={removed}");
    }

    /// Starts a drag of `dragged` from its current stored position.
    ///
    /// Returns `None` when the thought is unknown.
    pub fn begin_drag(
        &self,
        dragged: ThoughtId,
        siblings: impl IntoIterator<Item = (ThoughtId, Rect)>,
    ) -> Option<DragSession> {
        let thought = self.store.get(dragged)?;
        Some(DragSession::begin(dragged, (thought.x, thought.y), siblings))
    }

    /// Applies a finished drag.
    pub fn apply_drag(&self, outcome: DragOutcome) -> bool {
        match outcome {
            DragOutcome::Merge { source, target } => {
                self.merge_thoughts(source, target).is_some()
            }
            DragOutcome::Move { id, x, y } => self.move_thought(id, x, y),
        }
    }

    fn contains(&self, id: ThoughtId) -> bool {
        self.store.get(id).is_some()
    }
}
