//! The interaction state machine for one canvas.
//!
//! [`Board`] owns the live element collection and its history. Local input
//! goes through [`Board::handle`] and is recorded in an outbox of
//! [`BoardChange`]s for the sync layer; remote edits go through the
//! `apply_remote_*` methods and bypass both history and the outbox.

mod input;
mod selection;

pub use input::{InputEvent, Modifiers, Shortcut, ToolKind};
pub use selection::{Clipboard, Selection, SelectionArea};

use crate::element::{
    ApproxTextMeasure, CachedGeometry, Element, ElementError, ElementId, ElementKind,
    ElementPatch, ElementStyle, ElementType, IdGenerator, RenderCache, StrokeOutliner,
    TextMeasure, create_element, handle_zone_hit, hit_test, in_selection,
};
use crate::history::History;
use kurbo::{Point, Vec2};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Offset applied to pasted elements when no target point is given.
pub const PASTE_OFFSET: Vec2 = Vec2::new(20.0, 20.0);

/// Minted ids tried before falling back to the smallest unused one.
const FRESH_ID_ATTEMPTS: usize = 16;

/// What the board is doing with the pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Idle,
    Drawing { id: ElementId },
    Writing { id: ElementId },
    Selecting,
    /// `moved` records whether any delta was applied this gesture.
    Moving { last: Point, moved: bool },
    Erasing { last_check: Instant, removed: usize },
}

/// A local edit awaiting propagation.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardChange {
    Created(Element),
    Updated { id: ElementId, patch: ElementPatch },
    Deleted(ElementId),
    /// The whole collection was swapped (undo or redo).
    Replaced,
}

/// Tunables for gesture handling.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Emit a freehand update every this many appended points.
    pub freehand_throttle_points: usize,
    /// Minimum spacing between eraser hit-tests while dragging.
    pub erase_throttle: Duration,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            freehand_throttle_points: 5,
            erase_throttle: Duration::from_millis(16),
        }
    }
}

/// Live drawing state plus the gesture state machine.
pub struct Board {
    elements: Vec<Element>,
    history: History,
    mode: Mode,
    tool: ToolKind,
    /// Style applied to new elements.
    pub style: ElementStyle,
    selection: Selection,
    selection_area: Option<SelectionArea>,
    clipboard: Clipboard,
    ids: IdGenerator,
    cache: RenderCache,
    measure: Box<dyn TextMeasure + Send + Sync>,
    config: BoardConfig,
    changes: Vec<BoardChange>,
    /// Freehand points appended since the last emitted update.
    unsent_points: usize,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            elements: Vec::new(),
            history: History::new(),
            mode: Mode::Idle,
            tool: ToolKind::default(),
            style: ElementStyle::default(),
            selection: Selection::new(),
            selection_area: None,
            clipboard: Clipboard::default(),
            ids: IdGenerator::new(),
            cache: RenderCache::new(),
            measure: Box::new(ApproxTextMeasure),
            config,
            changes: Vec::new(),
            unsent_points: 0,
        }
    }

    /// Swap in real text metrics from the rendering backend.
    pub fn set_text_measure(&mut self, measure: Box<dyn TextMeasure + Send + Sync>) {
        self.measure = measure;
    }

    /// Swap in a different freehand outline algorithm.
    pub fn set_stroke_outliner(&mut self, outliner: Box<dyn StrokeOutliner + Send + Sync>) {
        self.cache = RenderCache::with_outliner(outliner);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| element.id == id)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_area(&self) -> Option<SelectionArea> {
        self.selection_area
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Drain pending local edits.
    pub fn take_changes(&mut self) -> Vec<BoardChange> {
        std::mem::take(&mut self.changes)
    }

    /// Render geometry of an element, rebuilt if stale.
    pub fn geometry(&mut self, id: ElementId) -> Option<&CachedGeometry> {
        let element = self.elements.iter().find(|element| element.id == id)?;
        Some(self.cache.reconstruct(element))
    }

    /// Dispatch one input event. Returns whether it changed anything.
    pub fn handle(&mut self, event: InputEvent, now: Instant) -> bool {
        match event {
            InputEvent::PointerDown(point) => self.pointer_down(point, now),
            InputEvent::PointerMove(point) => self.pointer_move(point, now),
            InputEvent::PointerUp => self.pointer_up(),
            InputEvent::TextCommitted(text) => self.commit_text(text),
            InputEvent::ToolChanged(tool) => self.set_tool(tool),
            InputEvent::Key { key, modifiers } => self.handle_key(&key, modifiers),
            InputEvent::Paste(target) => self.paste(target),
        }
    }

    /// Switch tools, dropping any selection. Refused while writing text.
    pub fn set_tool(&mut self, tool: ToolKind) -> bool {
        if matches!(self.mode, Mode::Writing { .. }) {
            return false;
        }
        self.tool = tool;
        self.selection.clear();
        self.selection_area = None;
        self.mode = Mode::Idle;
        true
    }

    pub fn pointer_down(&mut self, point: Point, now: Instant) -> bool {
        if self.tool.is_read_only() || self.mode != Mode::Idle {
            return false;
        }
        match self.tool {
            ToolKind::Selection => {
                self.begin_selection_gesture(point);
                true
            }
            ToolKind::Eraser => {
                let removed = self.erase_at(point);
                self.mode = Mode::Erasing {
                    last_check: now,
                    removed,
                };
                true
            }
            tool => match tool.element_type() {
                Some(element_type) => {
                    self.begin_draw(element_type, point);
                    true
                }
                None => false,
            },
        }
    }

    fn begin_selection_gesture(&mut self, point: Point) {
        let grabbed = self.elements.iter().any(|element| {
            self.selection.contains(element.id)
                && handle_zone_hit(element, point, self.measure.as_ref())
        });
        if grabbed {
            self.mode = Mode::Moving {
                last: point,
                moved: false,
            };
        } else {
            self.selection.clear();
            self.selection_area = Some(SelectionArea::at(point));
            self.mode = Mode::Selecting;
        }
    }

    fn begin_draw(&mut self, element_type: ElementType, point: Point) {
        let id = self.fresh_id();
        let element = create_element(
            id,
            point.x,
            point.y,
            point.x,
            point.y,
            element_type,
            &self.style,
        );
        self.elements.push(element.clone());
        self.changes.push(BoardChange::Created(element));
        self.unsent_points = 0;
        self.mode = match element_type {
            ElementType::Text => Mode::Writing { id },
            _ => Mode::Drawing { id },
        };
    }

    fn fresh_id(&mut self) -> ElementId {
        for _ in 0..FRESH_ID_ATTEMPTS {
            let id = self.ids.next_id();
            if self.element(id).is_none() {
                return id;
            }
        }
        let used: HashSet<ElementId> = self.elements.iter().map(|element| element.id).collect();
        let id = (1..=u64::MAX)
            .map(ElementId)
            .find(|id| !used.contains(id))
            .unwrap_or(ElementId(0));
        log::warn!("id generator exhausted, reusing free id {id}");
        id
    }

    pub fn pointer_move(&mut self, point: Point, now: Instant) -> bool {
        if self.tool.is_read_only() {
            return false;
        }
        match self.mode.clone() {
            Mode::Drawing { id } => self.extend_drawing(id, point),
            Mode::Selecting => {
                if let Some(area) = &mut self.selection_area {
                    area.end = point;
                }
                true
            }
            Mode::Moving { last, moved } => {
                let delta = point - last;
                if delta == Vec2::ZERO {
                    return false;
                }
                let applied = self.move_selection(delta);
                self.mode = Mode::Moving {
                    last: point,
                    moved: moved || applied,
                };
                applied
            }
            Mode::Erasing {
                last_check,
                removed,
            } => {
                if now.saturating_duration_since(last_check) < self.config.erase_throttle {
                    return false;
                }
                let hit = self.erase_at(point);
                self.mode = Mode::Erasing {
                    last_check: now,
                    removed: removed + hit,
                };
                hit > 0
            }
            Mode::Idle | Mode::Writing { .. } => false,
        }
    }

    fn extend_drawing(&mut self, id: ElementId, point: Point) -> bool {
        let Some(element) = self.elements.iter_mut().find(|element| element.id == id) else {
            // Deleted remotely mid-gesture.
            log::debug!("element {id} vanished while drawing");
            self.mode = Mode::Idle;
            return false;
        };
        match element.kind {
            ElementKind::Freehand { .. } => {
                element.push_point(point);
                self.unsent_points += 1;
                if self.unsent_points >= self.config.freehand_throttle_points.max(1) {
                    self.unsent_points = 0;
                    let patch = ElementPatch::geometry(element);
                    self.changes.push(BoardChange::Updated { id, patch });
                }
            }
            _ => {
                element.set_far_corner(point);
                self.changes.push(BoardChange::Updated {
                    id,
                    patch: ElementPatch::far_corner(point),
                });
            }
        }
        true
    }

    fn move_selection(&mut self, delta: Vec2) -> bool {
        let mut moved = false;
        for element in self.elements.iter_mut() {
            if self.selection.contains(element.id) {
                element.translate(delta);
                self.changes.push(BoardChange::Updated {
                    id: element.id,
                    patch: ElementPatch::geometry(element),
                });
                moved = true;
            }
        }
        moved
    }

    /// Remove every element under `point`, returning how many went.
    fn erase_at(&mut self, point: Point) -> usize {
        let mut doomed = Vec::new();
        for element in &self.elements {
            let geometry = match element.kind {
                ElementKind::Freehand { .. } => Some(self.cache.reconstruct(element)),
                _ => None,
            };
            if hit_test(element, point, geometry, self.measure.as_ref()) {
                doomed.push(element.id);
            }
        }
        if doomed.is_empty() {
            return 0;
        }
        self.elements.retain(|element| !doomed.contains(&element.id));
        for id in &doomed {
            self.selection.remove(*id);
            self.cache.invalidate(*id);
            self.changes.push(BoardChange::Deleted(*id));
        }
        log::debug!("erased {} element(s)", doomed.len());
        doomed.len()
    }

    pub fn pointer_up(&mut self) -> bool {
        if self.tool.is_read_only() {
            return false;
        }
        match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Drawing { id } => {
                if let Some(element) = self.elements.iter().find(|element| element.id == id) {
                    if let ElementKind::Freehand { .. } = element.kind {
                        let patch = ElementPatch::full(element);
                        self.changes.push(BoardChange::Updated { id, patch });
                    }
                }
                self.unsent_points = 0;
                self.history.push_snapshot(&self.elements);
                true
            }
            Mode::Selecting => {
                if let Some(area) = self.selection_area.take() {
                    let rect = area.rect();
                    let measure = self.measure.as_ref();
                    self.selection.replace(
                        self.elements
                            .iter()
                            .filter(|element| in_selection(element, rect, measure))
                            .map(|element| element.id),
                    );
                }
                true
            }
            Mode::Moving { moved, .. } => {
                if moved {
                    self.history.push_snapshot(&self.elements);
                }
                moved
            }
            Mode::Erasing { removed, .. } => {
                if removed > 0 {
                    self.history.push_snapshot(&self.elements);
                }
                removed > 0
            }
            mode @ Mode::Writing { .. } => {
                self.mode = mode;
                false
            }
            Mode::Idle => false,
        }
    }

    /// Finish the text element being written.
    pub fn commit_text(&mut self, text: String) -> bool {
        let Mode::Writing { id } = self.mode else {
            return false;
        };
        self.mode = Mode::Idle;
        let Some(element) = self.elements.iter_mut().find(|element| element.id == id) else {
            log::debug!("text element {id} vanished while writing");
            return false;
        };
        if let Err(err) = element.set_text(text) {
            log::warn!("cannot commit text: {err}");
            return false;
        }
        let patch = ElementPatch::text(element.text().unwrap_or_default());
        self.changes.push(BoardChange::Updated { id, patch });
        self.history.push_snapshot(&self.elements);
        true
    }

    fn accepts_commands(&self) -> bool {
        !self.tool.is_read_only() && self.mode == Mode::Idle
    }

    /// Apply a keyboard shortcut.
    pub fn handle_key(&mut self, key: &str, modifiers: Modifiers) -> bool {
        match Shortcut::from_key(key, modifiers) {
            Some(Shortcut::Undo) => self.undo(),
            Some(Shortcut::Redo) => self.redo(),
            Some(Shortcut::Copy) => self.copy_selected() > 0,
            Some(Shortcut::Paste) => self.paste(None),
            Some(Shortcut::Delete) => self.delete_selected(),
            None => false,
        }
    }

    pub fn undo(&mut self) -> bool {
        if !self.accepts_commands() {
            return false;
        }
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if !self.accepts_commands() {
            return false;
        }
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(&snapshot);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, snapshot: &[Element]) {
        self.elements = snapshot.to_vec();
        self.selection.retain_existing(&self.elements);
        self.cache.retain(&self.elements);
        self.changes.push(BoardChange::Replaced);
    }

    /// Delete every selected element as one undoable step.
    pub fn delete_selected(&mut self) -> bool {
        if !self.accepts_commands() || self.selection.is_empty() {
            return false;
        }
        let selection = &self.selection;
        let mut deleted = Vec::new();
        self.elements.retain(|element| {
            let keep = !selection.contains(element.id);
            if !keep {
                deleted.push(element.id);
            }
            keep
        });
        self.selection.clear();
        if deleted.is_empty() {
            return false;
        }
        for id in deleted {
            self.cache.invalidate(id);
            self.changes.push(BoardChange::Deleted(id));
        }
        self.history.push_snapshot(&self.elements);
        true
    }

    /// Copy the selected elements to the clipboard, returning how many.
    pub fn copy_selected(&mut self) -> usize {
        if !self.accepts_commands() {
            return 0;
        }
        let copied: Vec<Element> = self
            .elements
            .iter()
            .filter(|element| self.selection.contains(element.id))
            .cloned()
            .collect();
        let count = copied.len();
        if count > 0 {
            self.clipboard.set(copied);
        }
        count
    }

    /// Paste the clipboard with fresh ids and select the result.
    ///
    /// With a `target`, the first clipboard element lands with its origin on
    /// the target and the rest keep their relative offsets; without one,
    /// everything shifts by [`PASTE_OFFSET`].
    pub fn paste(&mut self, target: Option<Point>) -> bool {
        if !self.accepts_commands() || self.clipboard.is_empty() {
            return false;
        }
        let offset = match (target, self.clipboard.elements().first()) {
            (Some(target), Some(first)) => target - first.origin(),
            _ => PASTE_OFFSET,
        };
        let mut pasted = Vec::with_capacity(self.clipboard.len());
        for source in self.clipboard.elements().to_vec() {
            let mut element = source;
            element.id = self.fresh_id();
            element.translate(offset);
            pasted.push(element.id);
            self.elements.push(element.clone());
            self.changes.push(BoardChange::Created(element));
        }
        self.selection.replace(pasted);
        self.history.push_snapshot(&self.elements);
        true
    }

    /// Replace everything with an authoritative snapshot (e.g. on join).
    ///
    /// Clears selection and resets history to this single state.
    pub fn load_snapshot(&mut self, elements: Vec<Element>) {
        self.adopt(elements);
        self.selection.clear();
        self.selection_area = None;
        self.mode = Mode::Idle;
        self.unsent_points = 0;
        self.cache.clear();
        self.history.reset(&self.elements);
    }

    /// Replace the collection from a remote full update, keeping history.
    pub fn replace_elements(&mut self, elements: Vec<Element>) {
        self.adopt(elements);
        self.selection.retain_existing(&self.elements);
        self.cache.retain(&self.elements);
        self.abandon_vanished_gesture();
    }

    /// Take ownership of inbound elements. Freehand anchors are rederived
    /// from the points, since legacy strokes arrive without them.
    fn adopt(&mut self, elements: Vec<Element>) {
        self.elements = dedupe(elements);
        for element in &mut self.elements {
            self.ids.observe(element.id);
            element.refresh_stroke_bounds();
        }
    }

    /// Insert (or overwrite) an element created by a peer.
    pub fn apply_remote_create(&mut self, mut element: Element) {
        self.ids.observe(element.id);
        element.refresh_stroke_bounds();
        match self.elements.iter_mut().find(|e| e.id == element.id) {
            Some(existing) => *existing = element,
            None => self.elements.push(element),
        }
    }

    /// Patch an element edited by a peer.
    pub fn apply_remote_update(
        &mut self,
        id: ElementId,
        patch: &ElementPatch,
    ) -> Result<(), ElementError> {
        let element = self
            .elements
            .iter_mut()
            .find(|element| element.id == id)
            .ok_or(ElementError::UnknownElement(id))?;
        patch.apply(element)
    }

    /// Remove an element deleted by a peer.
    pub fn apply_remote_delete(&mut self, id: ElementId) -> Result<(), ElementError> {
        let index = self
            .elements
            .iter()
            .position(|element| element.id == id)
            .ok_or(ElementError::UnknownElement(id))?;
        self.elements.remove(index);
        self.selection.remove(id);
        self.cache.invalidate(id);
        self.abandon_vanished_gesture();
        Ok(())
    }

    fn abandon_vanished_gesture(&mut self) {
        if let Mode::Drawing { id } | Mode::Writing { id } = self.mode {
            if self.element(id).is_none() {
                self.mode = Mode::Idle;
            }
        }
    }
}

/// Keep the first element of each id.
fn dedupe(elements: Vec<Element>) -> Vec<Element> {
    let mut seen = HashSet::with_capacity(elements.len());
    let total = elements.len();
    let unique: Vec<Element> = elements
        .into_iter()
        .filter(|element| seen.insert(element.id))
        .collect();
    if unique.len() != total {
        log::warn!("dropped {} element(s) with duplicate ids", total - unique.len());
    }
    unique
}
