//! Partial element updates.

use super::{Element, ElementError, ElementKind};
use kurbo::Point;
use serde::{Deserialize, Deserializer, Serialize};

/// A partial set of authoritative fields sent in `element-update` messages.
///
/// Absent fields are left untouched. `fill` distinguishes "absent" from an
/// explicit `null`, which clears the fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub fill: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ElementPatch {
    /// Anchor coordinates, plus the points of a freehand stroke.
    pub fn geometry(element: &Element) -> Self {
        Self {
            x1: Some(element.x1),
            y1: Some(element.y1),
            x2: Some(element.x2),
            y2: Some(element.y2),
            points: element.points().map(<[Point]>::to_vec),
            ..Self::default()
        }
    }

    /// Every authoritative field except id and type.
    pub fn full(element: &Element) -> Self {
        Self {
            stroke: Some(element.stroke.clone()),
            fill: Some(element.fill.clone()),
            size: Some(element.size),
            text: element.text().map(str::to_string),
            ..Self::geometry(element)
        }
    }

    pub fn far_corner(point: Point) -> Self {
        Self {
            x2: Some(point.x),
            y2: Some(point.y),
            ..Self::default()
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `element`. Kind-specific fields that do not fit the element
    /// reject the whole patch and leave the element untouched.
    pub fn apply(&self, element: &mut Element) -> Result<(), ElementError> {
        let kind = element.element_type();
        if self.points.is_some() && !matches!(element.kind, ElementKind::Freehand { .. }) {
            return Err(ElementError::KindMismatch {
                field: "points",
                kind,
            });
        }
        if self.text.is_some() && !matches!(element.kind, ElementKind::Text { .. }) {
            return Err(ElementError::KindMismatch { field: "text", kind });
        }

        if let Some(x1) = self.x1 {
            element.x1 = x1;
        }
        if let Some(y1) = self.y1 {
            element.y1 = y1;
        }
        if let Some(x2) = self.x2 {
            element.x2 = x2;
        }
        if let Some(y2) = self.y2 {
            element.y2 = y2;
        }
        if let Some(stroke) = &self.stroke {
            element.stroke.clone_from(stroke);
        }
        if let Some(fill) = &self.fill {
            element.fill.clone_from(fill);
        }
        if let Some(size) = self.size {
            element.size = size;
        }
        match (&mut element.kind, &self.points, &self.text) {
            (ElementKind::Freehand { points }, Some(new_points), _) => {
                points.clone_from(new_points);
                element.refresh_stroke_bounds();
            }
            (ElementKind::Text { text }, _, Some(new_text)) => text.clone_from(new_text),
            _ => {}
        }
        Ok(())
    }
}
