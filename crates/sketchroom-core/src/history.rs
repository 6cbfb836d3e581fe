//! Snapshot-based undo/redo.

use crate::element::Element;
use std::sync::Arc;

/// An immutable copy of the element collection.
pub type Snapshot = Arc<[Element]>;

/// Linear list of snapshots with a cursor at the present state.
///
/// Snapshots are values: nothing that mutates the live collection can reach
/// into a stored snapshot.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// History holding a single empty snapshot.
    pub fn new() -> Self {
        Self::with_initial(&[])
    }

    pub fn with_initial(elements: &[Element]) -> Self {
        Self {
            snapshots: vec![Arc::from(elements)],
            cursor: 0,
        }
    }

    /// Record `elements` as the new present, discarding any redo tail.
    pub fn push_snapshot(&mut self, elements: &[Element]) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(Arc::from(elements));
        self.cursor = self.snapshots.len() - 1;
        log::trace!("history: pushed snapshot {}", self.cursor);
    }

    /// Step back, returning the snapshot to restore.
    pub fn undo(&mut self) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    /// Step forward, returning the snapshot to restore.
    pub fn redo(&mut self) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    /// Discard everything and start over from `elements`.
    pub fn reset(&mut self, elements: &[Element]) {
        *self = Self::with_initial(elements);
    }

    pub fn current(&self) -> Snapshot {
        Arc::clone(&self.snapshots[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementId, ElementStyle, ElementType, create_element};

    fn el(id: u64) -> Element {
        create_element(
            ElementId(id),
            0.0,
            0.0,
            10.0,
            10.0,
            ElementType::Line,
            &ElementStyle::default(),
        )
    }

    #[test]
    fn test_undo_redo_walks_snapshots() {
        let mut history = History::new();
        let mut live = Vec::new();
        for id in 1..=3 {
            live.push(el(id));
            history.push_snapshot(&live);
        }
        assert_eq!(history.len(), 4);

        for expected in (0..3).rev() {
            assert_eq!(history.undo().unwrap().len(), expected);
        }
        assert!(history.undo().is_none());

        for expected in 1..=3 {
            assert_eq!(history.redo().unwrap().len(), expected);
        }
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_after_undo_drops_redo_tail() {
        let mut history = History::new();
        history.push_snapshot(&[el(1)]);
        history.push_snapshot(&[el(1), el(2)]);
        history.undo();
        history.push_snapshot(&[el(1), el(3)]);

        assert!(!history.can_redo());
        assert!(history.redo().is_none());
        assert_eq!(history.len(), 3);
        assert_eq!(history.current()[1].id, ElementId(3));
    }

    #[test]
    fn test_snapshots_are_values() {
        let mut history = History::new();
        let mut live = vec![el(1)];
        history.push_snapshot(&live);
        live[0].x1 = 99.0;
        assert_eq!(history.current()[0].x1, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut history = History::new();
        history.push_snapshot(&[el(1)]);
        history.reset(&[el(5), el(6)]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.current().len(), 2);
        assert!(!history.can_undo());
    }
}
