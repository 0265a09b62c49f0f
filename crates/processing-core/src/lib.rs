//! Hotzone Processing Core
//!
//! Turns per-frame subject detections into a single region of interest:
//! - **Activity Grid:** Accumulate bounding boxes into an N×N heat map
//! - **Region Estimation:** Threshold the heat map into a padded rectangle
//! - **Classification:** Mark each subject IN or OUT of the region
//!
//! This crate is pure computation with no I/O, async, or platform
//! dependencies. All inputs are data; all outputs are data.

pub mod classify;
pub mod grid;
pub mod region;

pub use classify::{classify, ClassificationSummary};
pub use grid::ActivityGrid;
pub use region::{RegionEstimate, RegionEstimator, RegionEstimatorConfig, RegionOutcome};
