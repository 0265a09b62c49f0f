//! Hotzone Frame Model
//!
//! Defines the core data contracts shared by the processing and render
//! crates:
//! - **Boxes:** Normalized detected-subject bounding boxes
//! - **Regions:** The estimated tracking region and IN/OUT placements
//! - **Frames:** Sampled raster frames, track properties, and encoder buffers
//!
//! All coordinates are normalized to `[0.0, 1.0]` with the origin at the
//! bottom-left of the frame, matching what detectors report. Conversion to
//! top-left pixel space happens only at render time.

pub mod bbox;
pub mod frame;
pub mod region;

pub use bbox::*;
pub use frame::*;
pub use region::*;
