//! Drag collision decisions.
//!
//! # Responsibility
//! - Capture sibling note boxes when a drag starts.
//! - Report the live merge candidate and the final drag outcome.
//!
//! # Invariants
//! - Overlap is strict on both axes; touching edges never collide.
//! - With several overlapping siblings the first captured one wins.
//! - The session never mutates thoughts; `CanvasEngine::apply_drag` does.

use crate::model::thought::ThoughtId;

/// Axis-aligned box in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }
}

/// What a finished drag should do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// Fold `source` (the dragged note) into `target`.
    Merge {
        source: ThoughtId,
        target: ThoughtId,
    },
    /// Place the dragged note at its new position.
    Move { id: ThoughtId, x: f64, y: f64 },
}

/// State captured for one drag gesture.
#[derive(Debug, Clone)]
pub struct DragSession {
    dragged: ThoughtId,
    origin: (f64, f64),
    siblings: Vec<(ThoughtId, Rect)>,
}

impl DragSession {
    /// Starts a drag of `dragged`, whose pre-drag position is `origin`.
    ///
    /// `siblings` are the boxes of the rendered notes at this instant; an
    /// entry for the dragged note itself is ignored.
    pub fn begin(
        dragged: ThoughtId,
        origin: (f64, f64),
        siblings: impl IntoIterator<Item = (ThoughtId, Rect)>,
    ) -> Self {
        let siblings = siblings
            .into_iter()
            .filter(|(id, _)| *id != dragged)
            .collect();
        Self {
            dragged,
            origin,
            siblings,
        }
    }

    pub fn dragged(&self) -> ThoughtId {
        self.dragged
    }

    /// Live merge candidate for the dragged note's current box.
    pub fn candidate(&self, current: &Rect) -> Option<ThoughtId> {
        self.siblings
            .iter()
            .find(|(_, rect)| current.intersects(rect))
            .map(|(id, _)| *id)
    }

    /// Ends the drag. `offset` is the accumulated pointer delta.
    pub fn finish(self, current: &Rect, offset: (f64, f64)) -> DragOutcome {
        match self.candidate(current) {
            Some(target) => DragOutcome::Merge {
                source: self.dragged,
                target,
            },
            None => DragOutcome::Move {
                id: self.dragged,
                x: self.origin.0 + offset.0,
                y: self.origin.1 + offset.1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DragOutcome, DragSession, Rect};
    use uuid::Uuid;

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let right = Rect::new(10.0, 0.0, 20.0, 10.0);
        let below = Rect::new(0.0, 10.0, 10.0, 20.0);
        assert!(!a.intersects(&right));
        assert!(!a.intersects(&below));
        assert!(a.intersects(&Rect::new(9.9, 9.9, 30.0, 30.0)));
    }

    #[test]
    fn containment_counts_as_intersection() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        let inner = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(outer.intersects(&inner));
        assert!(inner.intersects(&outer));
    }

    #[test]
    fn first_captured_sibling_wins() {
        let dragged = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let session = DragSession::begin(
            dragged,
            (0.0, 0.0),
            vec![
                (first, Rect::new(0.0, 0.0, 50.0, 50.0)),
                (second, Rect::new(0.0, 0.0, 50.0, 50.0)),
            ],
        );
        assert_eq!(
            session.candidate(&Rect::new(10.0, 10.0, 20.0, 20.0)),
            Some(first)
        );
    }

    #[test]
    fn dragged_note_is_not_its_own_candidate() {
        let dragged = Uuid::new_v4();
        let session = DragSession::begin(
            dragged,
            (5.0, 5.0),
            vec![(dragged, Rect::new(5.0, 5.0, 50.0, 50.0))],
        );
        let outcome = session.finish(&Rect::new(5.0, 5.0, 50.0, 50.0), (0.0, 0.0));
        assert_eq!(
            outcome,
            DragOutcome::Move {
                id: dragged,
                x: 5.0,
                y: 5.0
            }
        );
    }

    #[test]
    fn finish_without_overlap_moves_by_offset() {
        let dragged = Uuid::new_v4();
        let sibling = Uuid::new_v4();
        let session = DragSession::begin(
            dragged,
            (100.0, 200.0),
            vec![(sibling, Rect::new(0.0, 0.0, 10.0, 10.0))],
        );
        let outcome = session.finish(&Rect::new(300.0, 300.0, 400.0, 350.0), (30.0, -20.0));
        assert_eq!(
            outcome,
            DragOutcome::Move {
                id: dragged,
                x: 130.0,
                y: 180.0
            }
        );
    }

    #[test]
    fn finish_with_overlap_merges_into_sibling() {
        let dragged = Uuid::new_v4();
        let sibling = Uuid::new_v4();
        let session = DragSession::begin(
            dragged,
            (0.0, 0.0),
            vec![(sibling, Rect::from_origin_size(100.0, 100.0, 50.0, 50.0))],
        );
        let current = Rect::from_origin_size(120.0, 120.0, 50.0, 50.0);
        let outcome = session.finish(&current, (120.0, 120.0));
        assert_eq!(
            outcome,
            DragOutcome::Merge {
                source: dragged,
                target: sibling
            }
        );
    }
}
