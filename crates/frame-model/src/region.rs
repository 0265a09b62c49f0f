//! Tracking region and subject placement types.
//!
//! All coordinates are normalized to `[0.0, 1.0]` range, origin bottom-left.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// The rectangle estimated to contain the meaningful subject activity for a
/// whole export run.
///
/// Always satisfies `0 <= min <= max <= 1` on both axes; the constructors
/// enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingRegion {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl TrackingRegion {
    /// Whole frame.
    pub const FULL: TrackingRegion = TrackingRegion {
        min_x: 0.0,
        max_x: 1.0,
        min_y: 0.0,
        max_y: 1.0,
    };

    /// Create a region, clamping every edge to `[0, 1]` and reordering
    /// swapped edges. Non-finite edges collapse to `0.0`.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (x0, x1) = (clamp(min_x), clamp(max_x));
        let (y0, y1) = (clamp(min_y), clamp(max_y));
        Self {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Grow each side by `pad_x` horizontally and `pad_y` vertically, then
    /// clamp back into the frame.
    pub fn padded(&self, pad_x: f64, pad_y: f64) -> Self {
        Self::new(
            self.min_x - pad_x,
            self.max_x + pad_x,
            self.min_y - pad_y,
            self.max_y + pad_y,
        )
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Area of the region (0.0 to 1.0).
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// The center point of this region.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if a normalized point is within this region.
    ///
    /// Edges are inclusive on all four sides, so a point lying exactly on
    /// the boundary is inside.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.min_x && px <= self.max_x && py >= self.min_y && py <= self.max_y
    }

    /// Whether `other` lies entirely within this region.
    pub fn encloses(&self, other: &TrackingRegion) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

impl Default for TrackingRegion {
    fn default() -> Self {
        Self::FULL
    }
}

/// Where a detected subject sits relative to the tracking region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    In,
    Out,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::In => "in",
            Placement::Out => "out",
        }
    }
}

/// A detected subject together with its IN/OUT placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedBox {
    pub bbox: BoundingBox,
    pub placement: Placement,
}

impl ClassifiedBox {
    pub fn is_in(&self) -> bool {
        self.placement == Placement::In
    }
}
