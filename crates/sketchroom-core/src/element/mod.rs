//! Drawing primitives shared between peers.
//!
//! An [`Element`] holds only authoritative fields: everything on it is what
//! crosses the wire, lands in storage and is captured by history snapshots.
//! Derived render data lives in the [`RenderCache`] side table instead.

mod cache;
mod hit;
mod patch;

pub use cache::{
    ARROW_HEAD_LENGTH, CachedGeometry, MIN_OUTLINE_HALF_WIDTH, OffsetOutliner, RenderCache,
    StrokeOutliner, reconstruct_cache,
};
pub use hit::{
    ApproxTextMeasure, HANDLE_PADDING, HIT_PADDING, HIT_TOLERANCE, SMALL_SELECTION, TextMeasure,
    handle_zone_hit, hit_test, in_selection, point_to_polyline_dist, point_to_segment_dist,
    text_bounds,
};
pub use patch::ElementPatch;

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Identifier of an element, unique within one canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of primitive types, without their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Line,
    Rectangle,
    Ellipse,
    Arrow,
    Freehand,
    Text,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Line => "line",
            ElementType::Rectangle => "rectangle",
            ElementType::Ellipse => "ellipse",
            ElementType::Arrow => "arrow",
            ElementType::Freehand => "freehand",
            ElementType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Primitive type plus the fields that only that primitive carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Line,
    Rectangle,
    #[serde(alias = "circle")]
    Ellipse,
    Arrow,
    #[serde(alias = "brush")]
    Freehand {
        #[serde(default)]
        points: Vec<Point>,
    },
    Text {
        #[serde(default)]
        text: String,
    },
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Line => ElementType::Line,
            ElementKind::Rectangle => ElementType::Rectangle,
            ElementKind::Ellipse => ElementType::Ellipse,
            ElementKind::Arrow => ElementType::Arrow,
            ElementKind::Freehand { .. } => ElementType::Freehand,
            ElementKind::Text { .. } => ElementType::Text,
        }
    }
}

/// Style applied to newly created elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStyle {
    /// Stroke color (CSS color string).
    pub stroke: String,
    /// Fill color, if any.
    pub fill: Option<String>,
    /// Stroke width, or font size for text.
    pub size: f64,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            stroke: default_stroke(),
            fill: None,
            size: default_size(),
        }
    }
}

fn default_stroke() -> String {
    "#000000".to_string()
}

fn default_size() -> f64 {
    2.0
}

/// A drawing primitive.
///
/// `x1,y1,x2,y2` are endpoints for lines and arrows, opposite corners for
/// rectangles and ellipses, the origin for text, and the bounding box of the
/// points for freehand strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default)]
    pub x1: f64,
    #[serde(default)]
    pub y1: f64,
    #[serde(default)]
    pub x2: f64,
    #[serde(default)]
    pub y2: f64,
    #[serde(default = "default_stroke")]
    pub stroke: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default = "default_size")]
    pub size: f64,
}

/// Errors raised when mutating elements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    #[error("unknown element {0}")]
    UnknownElement(ElementId),
    #[error("field `{field}` does not apply to a {kind} element")]
    KindMismatch {
        field: &'static str,
        kind: ElementType,
    },
}

/// Build a type-appropriate element with no cached render data.
///
/// Freehand strokes are seeded with `(x1, y1)` as their first point and
/// text starts empty.
pub fn create_element(
    id: ElementId,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    element_type: ElementType,
    style: &ElementStyle,
) -> Element {
    let kind = match element_type {
        ElementType::Line => ElementKind::Line,
        ElementType::Rectangle => ElementKind::Rectangle,
        ElementType::Ellipse => ElementKind::Ellipse,
        ElementType::Arrow => ElementKind::Arrow,
        ElementType::Freehand => ElementKind::Freehand {
            points: vec![Point::new(x1, y1)],
        },
        ElementType::Text => ElementKind::Text {
            text: String::new(),
        },
    };
    let (x2, y2) = match element_type {
        ElementType::Freehand => (x1, y1),
        _ => (x2, y2),
    };
    Element {
        id,
        kind,
        x1,
        y1,
        x2,
        y2,
        stroke: style.stroke.clone(),
        fill: style.fill.clone(),
        size: style.size,
    }
}

impl Element {
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// The `(x1, y1)` anchor.
    pub fn origin(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// The `(x2, y2)` anchor.
    pub fn far_corner(&self) -> Point {
        Point::new(self.x2, self.y2)
    }

    /// Axis-aligned bounds of the anchor coordinates (or stroke points).
    ///
    /// Text bounds depend on measurement; see [`text_bounds`].
    pub fn bounds(&self) -> Rect {
        match &self.kind {
            ElementKind::Freehand { points } if !points.is_empty() => points_bounds(points),
            _ => Rect::from_points(self.origin(), self.far_corner()),
        }
    }

    pub fn points(&self) -> Option<&[Point]> {
        match &self.kind {
            ElementKind::Freehand { points } => Some(points),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Move the far corner/endpoint while drawing a shape.
    pub fn set_far_corner(&mut self, point: Point) {
        self.x2 = point.x;
        self.y2 = point.y;
    }

    /// Append a point to a freehand stroke, returning the new point count.
    pub fn push_point(&mut self, point: Point) -> Option<usize> {
        let ElementKind::Freehand { points } = &mut self.kind else {
            return None;
        };
        points.push(point);
        let count = points.len();
        self.refresh_stroke_bounds();
        Some(count)
    }

    /// Replace the text of a text element.
    pub fn set_text(&mut self, value: String) -> Result<(), ElementError> {
        match &mut self.kind {
            ElementKind::Text { text } => {
                *text = value;
                Ok(())
            }
            other => Err(ElementError::KindMismatch {
                field: "text",
                kind: other.element_type(),
            }),
        }
    }

    /// Translate every coordinate by `delta`.
    pub fn translate(&mut self, delta: Vec2) {
        self.x1 += delta.x;
        self.y1 += delta.y;
        self.x2 += delta.x;
        self.y2 += delta.y;
        if let ElementKind::Freehand { points } = &mut self.kind {
            for point in points.iter_mut() {
                *point += delta;
            }
        }
    }

    /// Keep `x1..y2` of a freehand stroke equal to the bounds of its points.
    pub(crate) fn refresh_stroke_bounds(&mut self) {
        if let ElementKind::Freehand { points } = &self.kind {
            if points.is_empty() {
                return;
            }
            let bounds = points_bounds(points);
            self.x1 = bounds.x0;
            self.y1 = bounds.y0;
            self.x2 = bounds.x1;
            self.y2 = bounds.y1;
        }
    }
}

fn points_bounds(points: &[Point]) -> Rect {
    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Rect::new(min_x, min_y, max_x, max_y)
}

/// Observed ids at or above this are not allowed to drive minting, so a
/// hostile or corrupt id near `u64::MAX` cannot exhaust the id space.
pub const ID_CEILING: u64 = u64::MAX - (1 << 32);

/// Mints timestamp-derived, strictly increasing element ids.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(last: u64) -> Self {
        Self { last }
    }

    /// Next id: the current time in milliseconds, or one past the last id
    /// handed out or observed, whichever is larger.
    pub fn next_id(&mut self) -> ElementId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last = now.max(self.last.saturating_add(1));
        ElementId(self.last)
    }

    /// Record an id minted elsewhere so it is never handed out locally.
    /// Ids at or above [`ID_CEILING`] are ignored.
    pub fn observe(&mut self, id: ElementId) {
        if id.0 >= ID_CEILING {
            log::debug!("not advancing id generator past {id}");
            return;
        }
        self.last = self.last.max(id.0);
    }
}
