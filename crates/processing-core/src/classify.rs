//! IN/OUT classification of detected subjects against the tracking region.

use hotzone_model::{BoundingBox, ClassifiedBox, Placement, TrackingRegion};

/// Classify every box by whether its center lies in `region`.
///
/// Region edges are inclusive, so a center exactly on the boundary is
/// always IN.
pub fn classify(region: &TrackingRegion, boxes: &[BoundingBox]) -> Vec<ClassifiedBox> {
    boxes
        .iter()
        .map(|bbox| {
            let (cx, cy) = bbox.center();
            let placement = if region.contains(cx, cy) {
                Placement::In
            } else {
                Placement::Out
            };
            ClassifiedBox {
                bbox: *bbox,
                placement,
            }
        })
        .collect()
}

/// Counts of IN and OUT subjects in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub inside: usize,
    pub outside: usize,
}

impl ClassificationSummary {
    pub fn from_boxes(boxes: &[ClassifiedBox]) -> Self {
        let inside = boxes.iter().filter(|b| b.is_in()).count();
        Self {
            inside,
            outside: boxes.len() - inside,
        }
    }

    pub fn total(&self) -> usize {
        self.inside + self.outside
    }
}
