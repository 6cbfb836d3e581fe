//! Derived render geometry, kept beside elements rather than on them.

use super::{Element, ElementId, ElementKind};
use kurbo::{BezPath, Circle, Ellipse, Point, Rect, Shape, Vec2};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_6;

/// Length of each arrow-head stroke.
pub const ARROW_HEAD_LENGTH: f64 = 20.0;

/// Turns freehand points into a filled outline.
pub trait StrokeOutliner {
    fn outline(&self, points: &[Point], size: f64) -> BezPath;
}

/// Smallest half-width of a freehand outline, matching the usual 8px
/// rendered stroke regardless of the element's size.
pub const MIN_OUTLINE_HALF_WIDTH: f64 = 4.0;

/// Offsets the polyline by half the stroke size on each side, never less
/// than [`MIN_OUTLINE_HALF_WIDTH`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetOutliner;

impl StrokeOutliner for OffsetOutliner {
    fn outline(&self, points: &[Point], size: f64) -> BezPath {
        let radius = (size / 2.0).max(MIN_OUTLINE_HALF_WIDTH);
        match points {
            [] => BezPath::new(),
            [point] => Circle::new(*point, radius).to_path(0.1),
            _ => {
                let mut left = Vec::with_capacity(points.len());
                let mut right = Vec::with_capacity(points.len());
                let mut normal = Vec2::new(0.0, -1.0);
                for (i, &point) in points.iter().enumerate() {
                    let prev = points[i.saturating_sub(1)];
                    let next = points[(i + 1).min(points.len() - 1)];
                    let dir = next - prev;
                    let len = dir.hypot();
                    if len > f64::EPSILON {
                        normal = Vec2::new(-dir.y / len, dir.x / len);
                    }
                    left.push(point + normal * radius);
                    right.push(point - normal * radius);
                }

                let mut path = BezPath::new();
                path.move_to(left[0]);
                for &p in &left[1..] {
                    path.line_to(p);
                }
                for &p in right.iter().rev() {
                    path.line_to(p);
                }
                path.close_path();
                path
            }
        }
    }
}

/// Render geometry derived from one element.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedGeometry {
    pub path: BezPath,
}

/// Rebuild the render geometry of `element`. Pure: equal elements always
/// yield equal geometry.
pub fn reconstruct_cache(element: &Element, outliner: &dyn StrokeOutliner) -> CachedGeometry {
    let start = element.origin();
    let end = element.far_corner();
    let path = match &element.kind {
        ElementKind::Line => {
            let mut path = BezPath::new();
            path.move_to(start);
            path.line_to(end);
            path
        }
        ElementKind::Rectangle => Rect::from_points(start, end).to_path(0.1),
        ElementKind::Ellipse => Ellipse::from_rect(Rect::from_points(start, end)).to_path(0.1),
        ElementKind::Arrow => arrow_path(start, end),
        ElementKind::Freehand { points } => outliner.outline(points, element.size),
        // Glyphs are laid out by the renderer.
        ElementKind::Text { .. } => BezPath::new(),
    };
    CachedGeometry { path }
}

fn arrow_path(start: Point, end: Point) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(start);
    path.line_to(end);

    let dir = start - end;
    let len = dir.hypot();
    if len > f64::EPSILON {
        let angle = dir.atan2();
        for side in [FRAC_PI_6, -FRAC_PI_6] {
            let wing = end + Vec2::from_angle(angle + side) * ARROW_HEAD_LENGTH;
            path.move_to(end);
            path.line_to(wing);
        }
    }
    path
}

struct CacheEntry {
    source: Element,
    geometry: CachedGeometry,
}

/// Side table from element id to render geometry.
///
/// Entries are rebuilt lazily whenever the element they were derived from
/// has changed, so the table never has to be told about edits.
pub struct RenderCache {
    entries: HashMap<ElementId, CacheEntry>,
    outliner: Box<dyn StrokeOutliner + Send + Sync>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self::with_outliner(Box::new(OffsetOutliner))
    }

    pub fn with_outliner(outliner: Box<dyn StrokeOutliner + Send + Sync>) -> Self {
        Self {
            entries: HashMap::new(),
            outliner,
        }
    }

    /// Geometry for `element`, rebuilding it if missing or stale.
    pub fn reconstruct(&mut self, element: &Element) -> &CachedGeometry {
        let outliner = self.outliner.as_ref();
        let entry = self
            .entries
            .entry(element.id)
            .and_modify(|entry| {
                if entry.source != *element {
                    entry.geometry = reconstruct_cache(element, outliner);
                    entry.source = element.clone();
                }
            })
            .or_insert_with(|| CacheEntry {
                source: element.clone(),
                geometry: reconstruct_cache(element, outliner),
            });
        &entry.geometry
    }

    /// Cached geometry if present, without rebuilding.
    pub fn get(&self, id: ElementId) -> Option<&CachedGeometry> {
        self.entries.get(&id).map(|entry| &entry.geometry)
    }

    /// Drop entries for elements no longer in `elements`.
    pub fn retain(&mut self, elements: &[Element]) {
        self.entries
            .retain(|id, _| elements.iter().any(|element| element.id == *id));
    }

    pub fn invalidate(&mut self, id: ElementId) {
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementStyle, ElementType, create_element};

    fn stroke() -> Element {
        let mut el = create_element(
            ElementId(1),
            0.0,
            0.0,
            0.0,
            0.0,
            ElementType::Freehand,
            &ElementStyle {
                size: 6.0,
                ..ElementStyle::default()
            },
        );
        el.push_point(Point::new(50.0, 0.0));
        el.push_point(Point::new(100.0, 0.0));
        el
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let el = stroke();
        let a = reconstruct_cache(&el, &OffsetOutliner);
        let b = reconstruct_cache(&el, &OffsetOutliner);
        assert_eq!(a, b);

        let mut round_tripped: Element =
            serde_json::from_str(&serde_json::to_string(&el).unwrap()).unwrap();
        assert_eq!(reconstruct_cache(&round_tripped, &OffsetOutliner), a);
        round_tripped.translate(Vec2::new(1.0, 0.0));
        assert_ne!(reconstruct_cache(&round_tripped, &OffsetOutliner), a);
    }

    #[test]
    fn test_outline_covers_stroke() {
        let el = stroke();
        let geometry = reconstruct_cache(&el, &OffsetOutliner);
        assert!(geometry.path.contains(Point::new(25.0, 2.0)));
        assert!(geometry.path.contains(Point::new(25.0, -3.5)));
        assert!(!geometry.path.contains(Point::new(25.0, 5.0)));
    }

    #[test]
    fn test_thick_stroke_outline_follows_size() {
        let mut el = stroke();
        el.size = 20.0;
        let geometry = reconstruct_cache(&el, &OffsetOutliner);
        assert!(geometry.path.contains(Point::new(25.0, 9.0)));
        assert!(!geometry.path.contains(Point::new(25.0, 11.0)));
    }

    #[test]
    fn test_arrow_has_head() {
        let arrow = create_element(
            ElementId(2),
            0.0,
            0.0,
            100.0,
            0.0,
            ElementType::Arrow,
            &ElementStyle::default(),
        );
        let geometry = reconstruct_cache(&arrow, &OffsetOutliner);
        let bbox = geometry.path.bounding_box();
        assert!((bbox.x0 - 0.0).abs() < 1e-9);
        assert!((bbox.height() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_rebuilds_stale_entries() {
        let mut cache = RenderCache::new();
        let mut el = stroke();
        let before = cache.reconstruct(&el).clone();
        el.push_point(Point::new(100.0, 100.0));
        let after = cache.reconstruct(&el).clone();
        assert_ne!(before, after);
        assert_eq!(cache.len(), 1);

        cache.retain(&[]);
        assert!(cache.is_empty());
        assert!(cache.get(el.id).is_none());
    }
}
