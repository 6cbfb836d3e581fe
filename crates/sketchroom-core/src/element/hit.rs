//! Hit-testing and area selection.

use super::{Element, ElementKind};
use super::cache::CachedGeometry;
use kurbo::{Point, Rect, Shape, Size};

/// Padding of the bounding-box pre-check and of text boxes.
pub const HIT_PADDING: f64 = 3.0;
/// Maximum distance from a segment that still counts as a hit.
pub const HIT_TOLERANCE: f64 = 3.0;
/// Padding of the zone that starts a move of a selected element.
pub const HANDLE_PADDING: f64 = 15.0;
/// Half-width of the band around a freehand stroke that grabs it for moving.
const HANDLE_STROKE_HALF_WIDTH: f64 = 5.0;
/// Selection areas narrower or shorter than this select by intersection.
pub const SMALL_SELECTION: f64 = 20.0;
/// Portion of the text height drawn above the origin line.
const TEXT_ASCENT_RATIO: f64 = 0.2;

/// Measures rendered text. Rendering backends supply the real metrics.
pub trait TextMeasure {
    fn measure(&self, text: &str, size: f64) -> Size;
}

/// Monospace approximation: half an em per character.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn measure(&self, text: &str, size: f64) -> Size {
        Size::new(0.5 * size * text.chars().count() as f64, size)
    }
}

/// Distance from a point to a line segment.
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    (point - a.lerp(b, t)).hypot()
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Box of a text element with `measure`'s metrics, without padding.
pub fn text_bounds(element: &Element, measure: &dyn TextMeasure) -> Rect {
    let text = element.text().unwrap_or_default();
    let size = measure.measure(text, element.size);
    let top = element.y1 - TEXT_ASCENT_RATIO * size.height;
    Rect::new(element.x1, top, element.x1 + size.width, top + size.height)
}

fn edges(rect: Rect) -> [(Point, Point); 4] {
    let tl = Point::new(rect.x0, rect.y0);
    let tr = Point::new(rect.x1, rect.y0);
    let br = Point::new(rect.x1, rect.y1);
    let bl = Point::new(rect.x0, rect.y1);
    [(tl, tr), (tr, br), (br, bl), (bl, tl)]
}

/// Whether `point` touches `element`.
///
/// Freehand strokes are tested against their outline when `geometry` is
/// given, and against the raw points otherwise.
pub fn hit_test(
    element: &Element,
    point: Point,
    geometry: Option<&CachedGeometry>,
    measure: &dyn TextMeasure,
) -> bool {
    if let ElementKind::Text { text } = &element.kind {
        if text.trim().is_empty() {
            return false;
        }
        return text_bounds(element, measure)
            .inflate(HIT_PADDING, HIT_PADDING)
            .contains(point);
    }

    let padding = HIT_PADDING + element.size / 2.0;
    if !element.bounds().inflate(padding, padding).contains(point) {
        return false;
    }

    match &element.kind {
        ElementKind::Line | ElementKind::Arrow => {
            point_to_segment_dist(point, element.origin(), element.far_corner()) <= HIT_TOLERANCE
        }
        ElementKind::Rectangle | ElementKind::Ellipse => edges(element.bounds())
            .iter()
            .any(|&(a, b)| point_to_segment_dist(point, a, b) <= HIT_TOLERANCE),
        ElementKind::Freehand { points } => match geometry {
            Some(geometry) => geometry.path.contains(point),
            None => points
                .iter()
                .any(|p| p.distance(point) <= HIT_PADDING + element.size / 2.0),
        },
        ElementKind::Text { .. } => false,
    }
}

/// Whether `point` falls in the grab zone of a selected element.
///
/// Zones are padded more generously than [`hit_test`].
pub fn handle_zone_hit(element: &Element, point: Point, measure: &dyn TextMeasure) -> bool {
    match &element.kind {
        ElementKind::Text { text } if !text.is_empty() => text_bounds(element, measure)
            .inflate(HANDLE_PADDING, HANDLE_PADDING)
            .contains(point),
        ElementKind::Freehand { points } if points.len() > 1 => {
            point_to_polyline_dist(point, points)
                <= HANDLE_STROKE_HALF_WIDTH + element.size / 2.0
        }
        ElementKind::Freehand { points } => points.iter().any(|p| {
            (p.x - point.x).abs() <= HANDLE_PADDING && (p.y - point.y).abs() <= HANDLE_PADDING
        }),
        _ => element
            .bounds()
            .inflate(HANDLE_PADDING, HANDLE_PADDING)
            .contains(point),
    }
}

/// Whether a rubber-band `area` selects `element`.
///
/// Small areas (a click-drag) select anything they touch; larger ones only
/// select elements they fully contain.
pub fn in_selection(element: &Element, area: Rect, measure: &dyn TextMeasure) -> bool {
    let area = area.abs();
    let small = area.width() < SMALL_SELECTION && area.height() < SMALL_SELECTION;

    let bounds = match &element.kind {
        ElementKind::Text { text } if text.is_empty() => return false,
        ElementKind::Text { .. } => text_bounds(element, measure),
        ElementKind::Freehand { points } => {
            return if small {
                points.iter().any(|p| area.contains(*p))
            } else {
                !points.is_empty() && points.iter().all(|p| area.contains(*p))
            };
        }
        _ => element.bounds(),
    };

    if small {
        area.x0 <= bounds.x1 && bounds.x0 <= area.x1 && area.y0 <= bounds.y1 && bounds.y0 <= area.y1
    } else {
        area.x0 <= bounds.x0 && bounds.x1 <= area.x1 && area.y0 <= bounds.y0 && bounds.y1 <= area.y1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementId, ElementStyle, ElementType, create_element};

    fn make(kind: ElementType, x1: f64, y1: f64, x2: f64, y2: f64) -> Element {
        create_element(ElementId(1), x1, y1, x2, y2, kind, &ElementStyle::default())
    }

    #[test]
    fn test_segment_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(point_to_segment_dist(Point::new(5.0, 4.0), a, b), 4.0);
        assert_eq!(point_to_segment_dist(Point::new(13.0, 4.0), a, b), 5.0);
        assert_eq!(point_to_segment_dist(Point::new(3.0, 4.0), a, a), 5.0);
    }

    #[test]
    fn test_line_hit() {
        let line = make(ElementType::Line, 0.0, 0.0, 100.0, 100.0);
        assert!(hit_test(&line, Point::new(50.0, 51.0), None, &ApproxTextMeasure));
        assert!(!hit_test(&line, Point::new(50.0, 70.0), None, &ApproxTextMeasure));
        assert!(!hit_test(&line, Point::new(200.0, 200.0), None, &ApproxTextMeasure));
    }

    #[test]
    fn test_rectangle_hits_edges_only() {
        let rect = make(ElementType::Rectangle, 10.0, 10.0, 50.0, 50.0);
        assert!(hit_test(&rect, Point::new(11.0, 30.0), None, &ApproxTextMeasure));
        assert!(hit_test(&rect, Point::new(30.0, 50.0), None, &ApproxTextMeasure));
        assert!(!hit_test(&rect, Point::new(30.0, 30.0), None, &ApproxTextMeasure));
    }

    #[test]
    fn test_text_hit_uses_measured_box() {
        let mut text = make(ElementType::Text, 100.0, 100.0, 100.0, 100.0);
        text.size = 20.0;
        assert!(!hit_test(&text, Point::new(101.0, 101.0), None, &ApproxTextMeasure));

        text.set_text("hello".to_string()).unwrap();
        // 5 chars * 10px wide, 20px tall starting 4px above the origin line.
        assert!(hit_test(&text, Point::new(140.0, 110.0), None, &ApproxTextMeasure));
        assert!(!hit_test(&text, Point::new(160.0, 110.0), None, &ApproxTextMeasure));
    }

    #[test]
    fn test_freehand_falls_back_to_points() {
        let mut stroke = make(ElementType::Freehand, 0.0, 0.0, 0.0, 0.0);
        stroke.push_point(Point::new(40.0, 0.0));
        assert!(hit_test(&stroke, Point::new(40.0, 2.0), None, &ApproxTextMeasure));
        assert!(!hit_test(&stroke, Point::new(20.0, 2.0), None, &ApproxTextMeasure));
    }

    #[test]
    fn test_handle_zone_is_wider_than_hit() {
        let rect = make(ElementType::Rectangle, 10.0, 10.0, 50.0, 50.0);
        let point = Point::new(60.0, 30.0);
        assert!(!hit_test(&rect, point, None, &ApproxTextMeasure));
        assert!(handle_zone_hit(&rect, point, &ApproxTextMeasure));
        assert!(handle_zone_hit(&rect, Point::new(30.0, 30.0), &ApproxTextMeasure));
    }

    #[test]
    fn test_small_area_selects_by_intersection() {
        let rect = make(ElementType::Rectangle, 10.0, 10.0, 50.0, 50.0);
        assert!(in_selection(&rect, Rect::new(45.0, 45.0, 55.0, 55.0), &ApproxTextMeasure));
        assert!(!in_selection(&rect, Rect::new(60.0, 60.0, 70.0, 70.0), &ApproxTextMeasure));
    }

    #[test]
    fn test_large_area_requires_containment() {
        let rect = make(ElementType::Rectangle, 10.0, 10.0, 50.0, 50.0);
        assert!(!in_selection(&rect, Rect::new(20.0, 0.0, 100.0, 100.0), &ApproxTextMeasure));
        assert!(in_selection(&rect, Rect::new(100.0, 100.0, 0.0, 0.0), &ApproxTextMeasure));
    }

    #[test]
    fn test_freehand_selection_by_points() {
        let mut stroke = make(ElementType::Freehand, 10.0, 10.0, 10.0, 10.0);
        stroke.push_point(Point::new(60.0, 60.0));
        assert!(!in_selection(&stroke, Rect::new(0.0, 0.0, 40.0, 40.0), &ApproxTextMeasure));
        assert!(in_selection(&stroke, Rect::new(0.0, 0.0, 70.0, 70.0), &ApproxTextMeasure));
        assert!(in_selection(&stroke, Rect::new(5.0, 5.0, 15.0, 15.0), &ApproxTextMeasure));
    }
}
