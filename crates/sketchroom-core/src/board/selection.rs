//! Selection set, rubber-band area and clipboard.

use crate::element::{Element, ElementId};
use kurbo::{Point, Rect};
use std::collections::HashSet;

/// Ids of the selected elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    ids: HashSet<ElementId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: ElementId) {
        self.ids.insert(id);
    }

    pub fn remove(&mut self, id: ElementId) -> bool {
        self.ids.remove(&id)
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        self.ids.clear();
        self.ids.extend(ids);
    }

    /// Forget ids that no longer exist in `elements`.
    pub fn retain_existing(&mut self, elements: &[Element]) {
        self.ids
            .retain(|id| elements.iter().any(|element| element.id == *id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.ids.iter().copied()
    }
}

/// The rectangle dragged out while selecting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionArea {
    pub start: Point,
    pub end: Point,
}

impl SelectionArea {
    pub fn at(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }
}

/// Copied elements, in z-order.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    elements: Vec<Element>,
}

impl Clipboard {
    pub fn set(&mut self, elements: Vec<Element>) {
        self.elements = elements;
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}
