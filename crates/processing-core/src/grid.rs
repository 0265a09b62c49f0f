//! Activity heat map built from detected-subject bounding boxes.
//!
//! Every box increments all the cells it overlaps, not only the cell under
//! its center, so subjects straddling cell borders contribute everywhere
//! they appear. Accumulation is plain integer addition and therefore
//! order-independent.

use hotzone_model::BoundingBox;
use serde::{Deserialize, Serialize};

/// A square grid of activity counters over normalized frame space.
///
/// Row 0 is the bottom of the frame, matching the bottom-left origin of
/// [`BoundingBox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityGrid {
    size: usize,
    cells: Vec<u32>,
    boxes_accumulated: u64,
}

impl ActivityGrid {
    /// Create an all-zero grid with `size × size` cells. A size of zero is
    /// allowed and produces an empty grid that ignores every box.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0; size * size],
            boxes_accumulated: 0,
        }
    }

    /// Side length of the grid.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the grid has no cells at all.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of boxes fed into the grid so far.
    pub fn boxes_accumulated(&self) -> u64 {
        self.boxes_accumulated
    }

    /// Increment every cell the box overlaps by one.
    ///
    /// Box edges are mapped to cells with `floor(min * size)` and the cell
    /// holding the max edge, treating that edge as exclusive so a box ending
    /// exactly on a cell border does not spill into the next cell. Both ends
    /// are clamped into the grid; boxes outside `[0, 1]` are clamped, never
    /// rejected.
    pub fn accumulate(&mut self, bbox: &BoundingBox) {
        if self.size == 0 {
            return;
        }

        let (start_x, end_x) = axis_span(bbox.min_x, bbox.max_x, self.size);
        let (start_y, end_y) = axis_span(bbox.min_y, bbox.max_y, self.size);

        for row in start_y..=end_y {
            let offset = row * self.size;
            for cell in &mut self.cells[offset + start_x..=offset + end_x] {
                *cell = cell.saturating_add(1);
            }
        }
        self.boxes_accumulated += 1;
    }

    /// Accumulate every box in `boxes`.
    pub fn accumulate_all<'a>(&mut self, boxes: impl IntoIterator<Item = &'a BoundingBox>) {
        for bbox in boxes {
            self.accumulate(bbox);
        }
    }

    /// Value at `(col, row)`, or `None` outside the grid.
    pub fn cell(&self, col: usize, row: usize) -> Option<u32> {
        if col >= self.size || row >= self.size {
            return None;
        }
        Some(self.cells[row * self.size + col])
    }

    /// Largest cell value (0 for an empty grid).
    pub fn max_value(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    /// Sum of all cells.
    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&v| v as u64).sum()
    }

    /// Row-major cells, row 0 first.
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Iterate `(col, row, value)` over every cell.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, &v)| (idx % size, idx / size, v))
    }
}

/// Inclusive cell index range covered by `[min, max]` on one axis.
fn axis_span(min: f64, max: f64, size: usize) -> (usize, usize) {
    let n = size as f64;
    let sanitize = |v: f64| if v.is_finite() { v } else { 0.0 };
    let (a, b) = (sanitize(min), sanitize(max));
    let (lo, hi) = (a.min(b), a.max(b));

    let start = (lo * n).floor().clamp(0.0, n - 1.0) as usize;
    let end = ((hi * n).ceil() - 1.0).clamp(0.0, n - 1.0) as usize;
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_box_increments_every_overlapped_cell() {
        let mut grid = ActivityGrid::new(20);
        grid.accumulate(&BoundingBox::new(0.06, 0.06, 0.19, 0.19));

        for row in 0..20 {
            for col in 0..20 {
                let expected = u32::from((1..=3).contains(&col) && (1..=3).contains(&row));
                assert_eq!(grid.cell(col, row), Some(expected), "cell ({col},{row})");
            }
        }
        assert_eq!(grid.total(), 9);
    }

    #[test]
    fn test_quarter_box_on_four_grid() {
        let mut grid = ActivityGrid::new(4);
        grid.accumulate(&BoundingBox::new(0.0, 0.0, 0.5, 0.5));

        for (col, row, value) in grid.iter_cells() {
            let expected = u32::from(col <= 1 && row <= 1);
            assert_eq!(value, expected, "cell ({col},{row})");
        }
    }

    #[test]
    fn test_out_of_range_boxes_are_clamped() {
        let mut grid = ActivityGrid::new(4);
        grid.accumulate(&BoundingBox::new(1.2, 1.2, 1.5, 1.5));
        grid.accumulate(&BoundingBox::new(-0.5, -0.5, -0.1, -0.1));

        assert_eq!(grid.cell(3, 3), Some(1));
        assert_eq!(grid.cell(0, 0), Some(1));
        assert_eq!(grid.total(), 2);
    }

    #[test]
    fn test_degenerate_box_hits_one_cell() {
        let mut grid = ActivityGrid::new(4);
        grid.accumulate(&BoundingBox::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(grid.cell(2, 2), Some(1));
        assert_eq!(grid.total(), 1);
    }

    #[test]
    fn test_non_finite_coordinates_do_not_panic() {
        let mut grid = ActivityGrid::new(4);
        grid.accumulate(&BoundingBox {
            min_x: f64::NAN,
            min_y: 0.0,
            max_x: f64::INFINITY,
            max_y: 0.2,
            confidence: None,
        });
        assert_eq!(grid.boxes_accumulated(), 1);
        assert!(grid.total() >= 1);
    }

    #[test]
    fn test_empty_grid_ignores_boxes() {
        let mut grid = ActivityGrid::new(0);
        grid.accumulate(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(grid.is_empty());
        assert_eq!(grid.max_value(), 0);
        assert_eq!(grid.cell(0, 0), None);
    }

    #[test]
    fn test_full_frame_box_covers_grid() {
        let mut grid = ActivityGrid::new(5);
        grid.accumulate(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(grid.cells().iter().all(|&v| v == 1));
    }

    fn arb_box() -> impl Strategy<Value = BoundingBox> {
        (-0.2f64..1.2, -0.2f64..1.2, -0.2f64..1.2, -0.2f64..1.2)
            .prop_map(|(a, b, c, d)| BoundingBox::new(a, b, c, d))
    }

    proptest! {
        #[test]
        fn accumulation_order_does_not_matter(
            boxes in prop::collection::vec(arb_box(), 0..40),
            seed in any::<u64>(),
        ) {
            let mut forward = ActivityGrid::new(20);
            forward.accumulate_all(&boxes);

            let mut shuffled = boxes.clone();
            // Deterministic permutation derived from the seed.
            let len = shuffled.len();
            if len > 1 {
                let mut state = seed;
                for i in (1..len).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let j = (state >> 33) as usize % (i + 1);
                    shuffled.swap(i, j);
                }
            }
            let mut permuted = ActivityGrid::new(20);
            permuted.accumulate_all(&shuffled);

            let mut reversed = ActivityGrid::new(20);
            reversed.accumulate_all(boxes.iter().rev());

            prop_assert_eq!(forward.cells(), permuted.cells());
            prop_assert_eq!(forward.cells(), reversed.cells());
        }

        #[test]
        fn cell_counts_never_decrease(boxes in prop::collection::vec(arb_box(), 1..20)) {
            let mut grid = ActivityGrid::new(10);
            let mut previous = grid.cells().to_vec();
            for bbox in &boxes {
                grid.accumulate(bbox);
                for (before, after) in previous.iter().zip(grid.cells()) {
                    prop_assert!(after >= before);
                }
                previous = grid.cells().to_vec();
            }
        }
    }
}
