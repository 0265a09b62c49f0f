//! Presentation-time arithmetic for sampling and export stepping.
//!
//! Both the activity sampler and the export loop walk a video at fixed time
//! steps. Times are always derived from an integer step index
//! (`start + i * step`) so long runs never accumulate floating-point drift.

/// Output frame rate implied by a fixed presentation step.
pub fn output_fps(step_secs: f64) -> f64 {
    if step_secs <= 0.0 {
        return 0.0;
    }
    1.0 / step_secs
}

/// Index of the constant-rate output slot a timestamp falls into, counted
/// from `origin_secs`.
pub fn frame_slot(timestamp_secs: f64, origin_secs: f64, fps: f64) -> u64 {
    let offset = (timestamp_secs - origin_secs).max(0.0);
    (offset * fps).round() as u64
}

/// A half-open schedule of presentation times `[start, end)` at a fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSchedule {
    start_secs: f64,
    end_secs: f64,
    step_secs: f64,
}

impl StepSchedule {
    /// Create a schedule. A non-positive or non-finite step yields an empty
    /// schedule rather than an endless one.
    pub fn new(start_secs: f64, end_secs: f64, step_secs: f64) -> Self {
        Self {
            start_secs: start_secs.max(0.0),
            end_secs,
            step_secs,
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    pub fn end_secs(&self) -> f64 {
        self.end_secs
    }

    pub fn step_secs(&self) -> f64 {
        self.step_secs
    }

    fn is_degenerate(&self) -> bool {
        !(self.step_secs.is_finite() && self.step_secs > 0.0)
            || !self.end_secs.is_finite()
            || self.end_secs <= self.start_secs
    }

    /// Presentation time of step `index`, or `None` once past the end.
    pub fn time_at(&self, index: u64) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        let t = self.start_secs + index as f64 * self.step_secs;
        (t < self.end_secs).then_some(t)
    }

    /// Number of steps in the schedule.
    pub fn len(&self) -> u64 {
        if self.is_degenerate() {
            return 0;
        }
        let span = self.end_secs - self.start_secs;
        let mut count = (span / self.step_secs).ceil() as u64;
        // The division is approximate; settle on the index the iterator agrees with.
        while count > 0 && self.time_at(count - 1).is_none() {
            count -= 1;
        }
        while self.time_at(count).is_some() {
            count += 1;
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every presentation time in the schedule.
    pub fn iter(&self) -> StepIter {
        StepIter {
            schedule: *self,
            next_index: 0,
        }
    }
}

impl IntoIterator for StepSchedule {
    type Item = f64;
    type IntoIter = StepIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`StepSchedule`].
#[derive(Debug, Clone)]
pub struct StepIter {
    schedule: StepSchedule,
    next_index: u64,
}

impl StepIter {
    /// Index of the next time this iterator will yield.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }
}

impl Iterator for StepIter {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let t = self.schedule.time_at(self.next_index)?;
        self.next_index += 1;
        Some(t)
    }
}
