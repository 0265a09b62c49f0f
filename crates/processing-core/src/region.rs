//! Region estimation: the "Heatmap-to-Region" algorithm.
//!
//! Converts a populated [`ActivityGrid`] into one normalized
//! [`TrackingRegion`].
//!
//! # Algorithm
//!
//! 1. **Cutoff** from the hottest cell: `floor(max * threshold)`.
//! 2. **Band** search: skip the bottom rows (near-camera distortion) and the
//!    top rows (ceiling/background); all columns are searched.
//! 3. **Bounds** of every in-band cell strictly above the cutoff.
//! 4. **Padding**, more vertically than horizontally because feet and heads
//!    are undercounted by detectors, then clamped to the frame.
//!
//! Degenerate grids never fail: an empty grid and a grid with no hot cell
//! each resolve to a fixed default region.

use hotzone_common::config::ExportDefaults;
use hotzone_model::TrackingRegion;
use serde::{Deserialize, Serialize};

use crate::grid::ActivityGrid;

/// Configuration for the region estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEstimatorConfig {
    /// Fraction of the hottest cell a cell must strictly exceed.
    pub threshold: f64,

    /// Fraction of rows ignored at the bottom of the frame.
    pub skip_bottom_fraction: f64,

    /// Fraction of rows ignored at the top of the frame.
    pub skip_top_fraction: f64,

    /// Padding added to the left and right of the hot region.
    pub pad_x: f64,

    /// Padding added above and below the hot region.
    pub pad_y: f64,

    /// Region returned for a zero-size grid.
    pub empty_grid_region: TrackingRegion,

    /// Region returned when no in-band cell exceeds the cutoff.
    pub no_signal_region: TrackingRegion,
}

impl Default for RegionEstimatorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.40,
            skip_bottom_fraction: 0.05,
            skip_top_fraction: 0.30,
            pad_x: 0.03,
            pad_y: 0.08,
            empty_grid_region: TrackingRegion::new(0.1, 0.9, 0.1, 0.9),
            no_signal_region: TrackingRegion::new(0.15, 0.85, 0.25, 0.70),
        }
    }
}

impl From<&ExportDefaults> for RegionEstimatorConfig {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            threshold: defaults.threshold,
            skip_bottom_fraction: defaults.skip_bottom_fraction,
            skip_top_fraction: defaults.skip_top_fraction,
            pad_x: defaults.pad_x,
            pad_y: defaults.pad_y,
            ..Default::default()
        }
    }
}

impl RegionEstimatorConfig {
    /// Search every row instead of the default vertical band.
    pub fn without_band(mut self) -> Self {
        self.skip_bottom_fraction = 0.0;
        self.skip_top_fraction = 0.0;
        self
    }
}

/// How the region was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionOutcome {
    /// Derived from hot cells.
    Hot,
    /// The grid had no cells.
    EmptyGrid,
    /// No in-band cell exceeded the cutoff.
    NoSignal,
}

impl RegionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionOutcome::Hot => "hot",
            RegionOutcome::EmptyGrid => "empty_grid",
            RegionOutcome::NoSignal => "no_signal",
        }
    }
}

/// Inclusive cell bounds of the hot set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotCellBounds {
    pub min_col: usize,
    pub max_col: usize,
    pub min_row: usize,
    pub max_row: usize,
}

/// Region plus the intermediate values that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEstimate {
    pub region: TrackingRegion,
    pub outcome: RegionOutcome,
    pub max_value: u32,
    pub cutoff: u32,
    /// Searched rows as a half-open range `[start, end)`.
    pub band_rows: (usize, usize),
    pub hot_cells: Option<HotCellBounds>,
}

/// The region estimator.
#[derive(Debug, Clone, Default)]
pub struct RegionEstimator {
    config: RegionEstimatorConfig,
}

impl RegionEstimator {
    /// Create a new estimator with the given configuration.
    pub fn new(config: RegionEstimatorConfig) -> Self {
        Self { config }
    }

    /// Create an estimator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RegionEstimatorConfig::default())
    }

    /// Create an estimator with default band and padding and a custom
    /// threshold.
    pub fn with_threshold(threshold: f64) -> Self {
        Self::new(RegionEstimatorConfig {
            threshold,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &RegionEstimatorConfig {
        &self.config
    }

    /// Estimate the tracking region for a completed grid.
    pub fn estimate(&self, grid: &ActivityGrid) -> TrackingRegion {
        self.estimate_with_diagnostics(grid).region
    }

    /// Estimate the tracking region and return the values behind it.
    pub fn estimate_with_diagnostics(&self, grid: &ActivityGrid) -> RegionEstimate {
        if grid.is_empty() {
            return RegionEstimate {
                region: self.config.empty_grid_region,
                outcome: RegionOutcome::EmptyGrid,
                max_value: 0,
                cutoff: 0,
                band_rows: (0, 0),
                hot_cells: None,
            };
        }

        let size = grid.size();
        let max_value = grid.max_value();
        let cutoff = Self::cutoff(max_value, self.config.threshold);
        let band_rows = self.band_rows(size);

        let mut bounds: Option<HotCellBounds> = None;
        for row in band_rows.0..band_rows.1 {
            for col in 0..size {
                let value = grid.cell(col, row).unwrap_or(0);
                if value <= cutoff {
                    continue;
                }
                bounds = Some(match bounds {
                    None => HotCellBounds {
                        min_col: col,
                        max_col: col,
                        min_row: row,
                        max_row: row,
                    },
                    Some(b) => HotCellBounds {
                        min_col: b.min_col.min(col),
                        max_col: b.max_col.max(col),
                        min_row: b.min_row.min(row),
                        max_row: b.max_row.max(row),
                    },
                });
            }
        }

        let Some(hot) = bounds else {
            tracing::debug!(
                max_value,
                cutoff,
                band_start = band_rows.0,
                band_end = band_rows.1,
                "No hot cells in search band; using default region"
            );
            return RegionEstimate {
                region: self.config.no_signal_region,
                outcome: RegionOutcome::NoSignal,
                max_value,
                cutoff,
                band_rows,
                hot_cells: None,
            };
        };

        let n = size as f64;
        let region = TrackingRegion::new(
            hot.min_col as f64 / n,
            (hot.max_col + 1) as f64 / n,
            hot.min_row as f64 / n,
            (hot.max_row + 1) as f64 / n,
        )
        .padded(self.config.pad_x, self.config.pad_y);

        RegionEstimate {
            region,
            outcome: RegionOutcome::Hot,
            max_value,
            cutoff,
            band_rows,
            hot_cells: Some(hot),
        }
    }

    /// Minimum value a cell must strictly exceed to count as hot.
    fn cutoff(max_value: u32, threshold: f64) -> u32 {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            0.0
        };
        (max_value as f64 * threshold).floor() as u32
    }

    /// Half-open range of rows searched for hot cells.
    fn band_rows(&self, size: usize) -> (usize, usize) {
        let n = size as f64;
        let skip_bottom = (n * self.config.skip_bottom_fraction.max(0.0)).floor() as usize;
        let skip_top = (n * self.config.skip_top_fraction.max(0.0)).floor() as usize;
        let start = skip_bottom.min(size);
        let end = size.saturating_sub(skip_top).max(start);
        (start, end)
    }
}
