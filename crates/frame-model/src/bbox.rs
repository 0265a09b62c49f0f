//! Detected-subject bounding boxes.

use serde::{Deserialize, Serialize};

/// An axis-aligned box around one detected subject in one frame.
///
/// Coordinates are normalized with `(0.0, 0.0)` at the bottom-left and
/// `(1.0, 1.0)` at the top-right of the frame. Values are stored as the
/// detector reported them; consumers clamp where they need to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    /// Detector confidence in `[0.0, 1.0]`, when the detector provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl BoundingBox {
    /// Create a box from its edges. Swapped edges are reordered so
    /// `min <= max` holds on both axes.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
            confidence: None,
        }
    }

    /// Create a box from its center and size.
    pub fn from_center(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        let half_w = w.abs() / 2.0;
        let half_h = h.abs() / 2.0;
        Self::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// The center point of this box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Whether every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_edges() {
        let b = BoundingBox::new(0.6, 0.7, 0.2, 0.1);
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (0.2, 0.1, 0.6, 0.7));
    }

    #[test]
    fn test_derived_dimensions() {
        let b = BoundingBox::new(0.1, 0.2, 0.5, 0.8);
        assert!((b.width() - 0.4).abs() < 1e-9);
        assert!((b.height() - 0.6).abs() < 1e-9);
        let (cx, cy) = b.center();
        assert!((cx - 0.3).abs() < 1e-9);
        assert!((cy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_center() {
        let b = BoundingBox::from_center(0.5, 0.5, 0.2, 0.4);
        assert!((b.min_x - 0.4).abs() < 1e-9);
        assert!((b.max_y - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_optional_in_json() {
        let b: BoundingBox =
            serde_json::from_str(r#"{"min_x":0.0,"min_y":0.0,"max_x":1.0,"max_y":1.0}"#).unwrap();
        assert!(b.confidence.is_none());

        let json = serde_json::to_string(&b.with_confidence(1.7)).unwrap();
        assert!(json.contains("\"confidence\":1.0"));
    }
}
