//! Fixed-interval frame sampling.

use hotzone_common::clock::{StepIter, StepSchedule};
use hotzone_common::config::ExportDefaults;
use hotzone_model::SampleFrame;

use crate::source::FrameSource;

/// Sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Seconds between samples.
    pub interval_secs: f64,
    /// Maximum number of frames to produce.
    pub max_count: usize,
    /// Timestamp tolerance passed to the frame source.
    pub tolerance_secs: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10.0,
            max_count: 20,
            tolerance_secs: 0.1,
        }
    }
}

impl From<&ExportDefaults> for SamplerConfig {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            interval_secs: defaults.sample_interval_secs,
            max_count: defaults.max_samples,
            tolerance_secs: defaults.fetch_tolerance_secs,
        }
    }
}

/// Pulls frames from a source at `0, interval, 2*interval, ...`.
#[derive(Debug, Clone, Default)]
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Begin a sampling run over `source`.
    ///
    /// The source duration is read once here. If it cannot be read the run
    /// yields nothing.
    pub async fn start<'a>(&self, source: &'a dyn FrameSource) -> SampleRun<'a> {
        let duration_secs = match source.duration_secs().await {
            Ok(d) if d.is_finite() && d > 0.0 => d,
            Ok(d) => {
                tracing::warn!(duration_secs = d, "Source has no usable duration; nothing to sample");
                0.0
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read source duration; nothing to sample");
                0.0
            }
        };

        let schedule = StepSchedule::new(0.0, duration_secs, self.config.interval_secs);
        tracing::debug!(
            duration_secs,
            interval_secs = self.config.interval_secs,
            max_count = self.config.max_count,
            planned = schedule.len(),
            "Starting sample run"
        );

        SampleRun {
            source,
            steps: schedule.iter(),
            max_count: self.config.max_count,
            tolerance_secs: self.config.tolerance_secs,
            duration_secs,
            produced: 0,
            skipped: 0,
        }
    }

    /// Sample `source` to completion.
    pub async fn collect(&self, source: &dyn FrameSource) -> Vec<SampleFrame> {
        let mut run = self.start(source).await;
        let mut frames = Vec::new();
        while let Some(frame) = run.next_frame().await {
            frames.push(frame);
        }
        frames
    }
}

/// One pass over a source. Finite and not restartable.
pub struct SampleRun<'a> {
    source: &'a dyn FrameSource,
    steps: StepIter,
    max_count: usize,
    tolerance_secs: f64,
    duration_secs: f64,
    produced: usize,
    skipped: usize,
}

impl SampleRun<'_> {
    /// Fetch the next frame, skipping times the source cannot decode.
    pub async fn next_frame(&mut self) -> Option<SampleFrame> {
        while self.produced < self.max_count {
            let time_secs = self.steps.next()?;
            match self.source.frame_at(time_secs, self.tolerance_secs).await {
                Ok(image) => {
                    self.produced += 1;
                    return Some(SampleFrame::new(time_secs, image));
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!(time_secs, error = %e, "Skipping unreadable sample");
                }
            }
        }
        None
    }

    /// Frames yielded so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Sample times that failed to decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}
