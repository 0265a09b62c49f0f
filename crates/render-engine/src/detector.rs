//! Object-detection capability used by both export passes.

use std::sync::Arc;

use async_trait::async_trait;
use hotzone_common::error::HotzoneResult;
use hotzone_model::BoundingBox;
use image::RgbImage;

/// Finds subjects in a frame.
///
/// Implementations wrap whatever model or service does the detection. An
/// empty result is a normal answer, not an error; errors are reserved for
/// the detector itself failing on this frame.
#[async_trait]
pub trait SubjectDetector: Send + Sync {
    /// Detect subjects, returning normalized boxes with a bottom-left
    /// origin.
    async fn detect(&self, frame: &RgbImage) -> HotzoneResult<Vec<BoundingBox>>;

    /// Detector name (for logging/debugging).
    fn name(&self) -> &str {
        "detector"
    }
}

#[async_trait]
impl<T: SubjectDetector + ?Sized> SubjectDetector for Arc<T> {
    async fn detect(&self, frame: &RgbImage) -> HotzoneResult<Vec<BoundingBox>> {
        (**self).detect(frame).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
