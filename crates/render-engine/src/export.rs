//! Two-pass export: estimate the tracking region, then stream every frame
//! of the requested window through detection, overlay and encoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hotzone_common::clock::{output_fps, StepSchedule};
use hotzone_common::config::ExportDefaults;
use hotzone_common::error::{HotzoneError, HotzoneResult};
use hotzone_model::{FrameBuffer, TrackingRegion, VideoTrackInfo};
use hotzone_processing::{
    classify, ActivityGrid, ClassificationSummary, RegionEstimate, RegionEstimator,
    RegionEstimatorConfig, RegionOutcome,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::detector::SubjectDetector;
use crate::renderer::{FrameRenderer, OverlayRenderer};
use crate::sampler::{FrameSampler, SamplerConfig};
use crate::sink::{EncoderSink, FfmpegSinkFactory, SinkFactory};
use crate::source::{FfmpegFrameSource, FrameSource};

/// What to export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Source video.
    pub input: PathBuf,

    /// Output file. Anything already there is replaced.
    pub output: PathBuf,

    /// Start of the export window (seconds).
    pub start_secs: f64,

    /// Length of the export window. `None` runs to the end of the source.
    pub duration_secs: Option<f64>,

    /// Activity grid side length.
    pub grid_size: usize,

    /// Hot-cell threshold fraction. Overrides the estimator settings.
    pub threshold: f64,
}

impl ExportRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self::from_defaults(input, output, &ExportDefaults::default())
    }

    pub fn from_defaults(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        defaults: &ExportDefaults,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            start_secs: 0.0,
            duration_secs: None,
            grid_size: defaults.grid_size,
            threshold: defaults.threshold,
        }
    }

    /// Restrict the export to `[start, start + duration)`.
    pub fn with_window(mut self, start_secs: f64, duration_secs: f64) -> Self {
        self.start_secs = start_secs;
        self.duration_secs = Some(duration_secs);
        self
    }

    fn validate(&self) -> HotzoneResult<()> {
        if !(self.start_secs.is_finite() && self.start_secs >= 0.0) {
            return Err(HotzoneError::config(format!(
                "start_secs must be a non-negative number, got {}",
                self.start_secs
            )));
        }
        if let Some(d) = self.duration_secs {
            if !(d.is_finite() && d > 0.0) {
                return Err(HotzoneError::config(format!(
                    "duration_secs must be positive, got {d}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(HotzoneError::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.input == self.output {
            return Err(HotzoneError::config("Output path must differ from the input"));
        }
        Ok(())
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    /// Pass-1 sampling.
    pub sampler: SamplerConfig,

    /// Band and padding for region estimation.
    pub estimator: RegionEstimatorConfig,

    /// Pass-2 presentation step (seconds).
    pub frame_interval_secs: f64,

    /// Timestamp tolerance for pass-2 fetches.
    pub fetch_tolerance_secs: f64,

    /// Delay between readiness polls while the encoder is busy.
    pub backpressure_poll: Duration,

    /// Give up once the encoder has been busy this long.
    pub backpressure_timeout: Duration,

    /// Report progress every N pushed frames.
    pub progress_every: u64,

    /// Write `<output>.report.json` next to the video.
    pub write_report: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for ExportSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            sampler: SamplerConfig::from(defaults),
            estimator: RegionEstimatorConfig::from(defaults),
            frame_interval_secs: defaults.frame_interval_secs,
            fetch_tolerance_secs: defaults.fetch_tolerance_secs,
            backpressure_poll: Duration::from_millis(defaults.backpressure_poll_ms),
            backpressure_timeout: Duration::from_millis(defaults.backpressure_timeout_ms),
            progress_every: defaults.progress_every,
            write_report: false,
        }
    }
}

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current stage.
    pub stage: ExportStage,

    /// Streaming progress [0.0, 1.0].
    pub progress: f64,

    /// Frames pushed to the encoder so far.
    pub frames_pushed: u64,

    /// Pass-2 steps skipped so far.
    pub frames_skipped: u64,

    /// Pass-2 steps planned.
    pub total_steps: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,
}

/// Stages of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Init,
    Sampling,
    Estimating,
    OpeningSink,
    Streaming,
    Finalizing,
    Complete,
    Failed,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Init => "init",
            ExportStage::Sampling => "sampling",
            ExportStage::Estimating => "estimating",
            ExportStage::OpeningSink => "opening_sink",
            ExportStage::Streaming => "streaming",
            ExportStage::Finalizing => "finalizing",
            ExportStage::Complete => "complete",
            ExportStage::Failed => "failed",
        }
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output: PathBuf,
    pub region: TrackingRegion,
    pub region_outcome: RegionOutcome,
    /// Pass-1 frames that were decoded.
    pub sampled_frames: usize,
    pub frames_pushed: u64,
    /// Pass-2 steps dropped after a fetch, detection or render failure.
    pub frames_skipped: u64,
    /// Frames the encoder wrote, including gap repeats.
    pub frames_written: u64,
    pub subjects_in: u64,
    pub subjects_out: u64,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl ExportReport {
    /// Where [`ExportSettings::write_report`] puts the JSON report.
    pub fn report_path(output: &Path) -> PathBuf {
        output.with_extension("report.json")
    }

    fn write_json(&self) -> HotzoneResult<PathBuf> {
        let path = Self::report_path(&self.output);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Mutable bookkeeping for one run.
struct ExportSession {
    stage: ExportStage,
    started: Instant,
    progress: Option<ProgressCallback>,
    total_steps: u64,
    frames_pushed: u64,
    frames_skipped: u64,
    subjects: SubjectTotals,
}

#[derive(Debug, Default, Clone, Copy)]
struct SubjectTotals {
    inside: u64,
    outside: u64,
}

impl SubjectTotals {
    fn add(&mut self, summary: ClassificationSummary) {
        self.inside += summary.inside as u64;
        self.outside += summary.outside as u64;
    }
}

impl ExportSession {
    fn new(progress: Option<ProgressCallback>) -> Self {
        Self {
            stage: ExportStage::Init,
            started: Instant::now(),
            progress,
            total_steps: 0,
            frames_pushed: 0,
            frames_skipped: 0,
            subjects: SubjectTotals::default(),
        }
    }

    fn enter(&mut self, stage: ExportStage) {
        self.stage = stage;
        tracing::info!(stage = stage.as_str(), "Export stage");
        self.report();
    }

    fn fraction(&self) -> f64 {
        match self.stage {
            ExportStage::Complete => 1.0,
            _ if self.total_steps == 0 => 0.0,
            _ => ((self.frames_pushed + self.frames_skipped) as f64 / self.total_steps as f64)
                .min(1.0),
        }
    }

    fn report(&self) {
        let Some(cb) = &self.progress else {
            return;
        };
        let progress = self.fraction();
        let elapsed = self.started.elapsed().as_secs_f64();
        let eta_secs = if progress > 0.0 && progress < 1.0 {
            elapsed / progress * (1.0 - progress)
        } else {
            0.0
        };
        cb(ExportProgress {
            stage: self.stage,
            progress,
            frames_pushed: self.frames_pushed,
            frames_skipped: self.frames_skipped,
            total_steps: self.total_steps,
            eta_secs,
        });
    }

    fn fail(&mut self, error: &HotzoneError) {
        tracing::error!(stage = self.stage.as_str(), error = %error, "Export failed");
        self.stage = ExportStage::Failed;
        self.report();
    }
}

/// Runs the two-pass export against pluggable collaborators.
pub struct ExportPipeline {
    detector: Arc<dyn SubjectDetector>,
    renderer: Arc<dyn FrameRenderer>,
    settings: ExportSettings,
}

impl ExportPipeline {
    pub fn new(
        detector: Arc<dyn SubjectDetector>,
        renderer: Arc<dyn FrameRenderer>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            detector,
            renderer,
            settings,
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Export `request` from `source` into a sink opened through `sinks`.
    ///
    /// The sink is either finished or aborted before this returns.
    pub async fn run(
        &self,
        source: &dyn FrameSource,
        sinks: &dyn SinkFactory,
        request: &ExportRequest,
        progress: Option<ProgressCallback>,
    ) -> HotzoneResult<ExportReport> {
        tracing::info!(
            input = %request.input.display(),
            output = %request.output.display(),
            start_secs = request.start_secs,
            duration_secs = ?request.duration_secs,
            grid_size = request.grid_size,
            threshold = request.threshold,
            detector = self.detector.name(),
            "Starting export"
        );

        let mut session = ExportSession::new(progress);
        match self.run_stages(source, sinks, request, &mut session).await {
            Ok(report) => Ok(report),
            Err(e) => {
                session.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        source: &dyn FrameSource,
        sinks: &dyn SinkFactory,
        request: &ExportRequest,
        session: &mut ExportSession,
    ) -> HotzoneResult<ExportReport> {
        session.enter(ExportStage::Init);
        request.validate()?;
        let info = self.load_track(source).await?;

        session.enter(ExportStage::Sampling);
        let (grid, sampled_frames) = self.build_grid(source, request.grid_size).await?;

        session.enter(ExportStage::Estimating);
        let estimate = self.estimate_region(&grid, request.threshold);
        let region = estimate.region;

        session.enter(ExportStage::OpeningSink);
        let fps = output_fps(self.settings.frame_interval_secs);
        prepare_output(&request.output)?;
        let mut sink = sinks
            .open(&request.output, info.natural_size(), fps)
            .await
            .map_err(|e| match e {
                HotzoneError::Sink { .. } | HotzoneError::Unsupported { .. } => e,
                other => HotzoneError::sink(format!("Failed to open encoder: {other}")),
            })?;

        session.enter(ExportStage::Streaming);
        if let Err(e) = self
            .stream(source, sink.as_mut(), request, &info, &region, session)
            .await
        {
            sink.abort().await;
            return Err(e);
        }

        session.enter(ExportStage::Finalizing);
        let stats = match sink.finish().await {
            Ok(stats) => stats,
            Err(e) => {
                sink.abort().await;
                return Err(e);
            }
        };
        drop(sink);

        let report = ExportReport {
            output: request.output.clone(),
            region,
            region_outcome: estimate.outcome,
            sampled_frames,
            frames_pushed: session.frames_pushed,
            frames_skipped: session.frames_skipped,
            frames_written: stats.frames_written,
            subjects_in: session.subjects.inside,
            subjects_out: session.subjects.outside,
            elapsed_secs: session.started.elapsed().as_secs_f64(),
            finished_at: Utc::now(),
        };

        if self.settings.write_report {
            match report.write_json() {
                Ok(path) => tracing::info!(path = %path.display(), "Wrote export report"),
                Err(e) => tracing::warn!(error = %e, "Failed to write export report"),
            }
        }

        session.enter(ExportStage::Complete);
        tracing::info!(
            output = %report.output.display(),
            frames_pushed = report.frames_pushed,
            frames_skipped = report.frames_skipped,
            elapsed_secs = report.elapsed_secs,
            "Export complete"
        );
        Ok(report)
    }

    async fn load_track(&self, source: &dyn FrameSource) -> HotzoneResult<VideoTrackInfo> {
        let init = ExportStage::Init.as_str();
        let info = source
            .track_info()
            .await
            .map_err(|e| HotzoneError::source_stage(init, e.to_string()))?;
        if info.width == 0 || info.height == 0 {
            return Err(HotzoneError::source_stage(
                init,
                format!("Video track has no size ({}x{})", info.width, info.height),
            ));
        }
        if !(info.duration_secs.is_finite() && info.duration_secs > 0.0) {
            return Err(HotzoneError::source_stage(
                init,
                format!("Video track has no duration ({})", info.duration_secs),
            ));
        }
        tracing::info!(
            width = info.width,
            height = info.height,
            frame_rate = info.frame_rate,
            duration_secs = info.duration_secs,
            "Loaded video track"
        );
        Ok(info)
    }

    /// Pass 1: accumulate detections from coarse samples.
    async fn build_grid(
        &self,
        source: &dyn FrameSource,
        grid_size: usize,
    ) -> HotzoneResult<(ActivityGrid, usize)> {
        let mut grid = ActivityGrid::new(grid_size);
        let sampler = FrameSampler::new(self.settings.sampler);
        let mut run = sampler.start(source).await;

        while let Some(frame) = run.next_frame().await {
            match self.detector.detect(&frame.image).await {
                Ok(boxes) => grid.accumulate_all(&boxes),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(time_secs = frame.time_secs, error = %e, "Detection failed on sample");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            sampled = run.produced(),
            skipped = run.skipped(),
            boxes = grid.boxes_accumulated(),
            max_value = grid.max_value(),
            "Activity grid built"
        );
        Ok((grid, run.produced()))
    }

    fn estimate_region(&self, grid: &ActivityGrid, threshold: f64) -> RegionEstimate {
        let estimator = RegionEstimator::new(RegionEstimatorConfig {
            threshold,
            ..self.settings.estimator.clone()
        });
        let estimate = estimator.estimate_with_diagnostics(grid);
        tracing::info!(
            outcome = estimate.outcome.as_str(),
            min_x = estimate.region.min_x(),
            max_x = estimate.region.max_x(),
            min_y = estimate.region.min_y(),
            max_y = estimate.region.max_y(),
            cutoff = estimate.cutoff,
            "Tracking region estimated"
        );
        estimate
    }

    /// Pass 2: one push per successful step, in presentation order.
    async fn stream(
        &self,
        source: &dyn FrameSource,
        sink: &mut dyn EncoderSink,
        request: &ExportRequest,
        info: &VideoTrackInfo,
        region: &TrackingRegion,
        session: &mut ExportSession,
    ) -> HotzoneResult<()> {
        let end_secs = match request.duration_secs {
            Some(d) => (request.start_secs + d).min(info.duration_secs),
            None => info.duration_secs,
        };
        let schedule = StepSchedule::new(
            request.start_secs,
            end_secs,
            self.settings.frame_interval_secs,
        );
        session.total_steps = schedule.len();
        let expected_size = info.natural_size();
        let progress_every = self.settings.progress_every.max(1);

        for time_secs in schedule {
            let mut frame = match source
                .frame_at(time_secs, self.settings.fetch_tolerance_secs)
                .await
            {
                Ok(frame) => frame,
                Err(e) if e.is_recoverable() => {
                    session.frames_skipped += 1;
                    tracing::debug!(time_secs, error = %e, "Skipping unreadable frame");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if frame.dimensions() != expected_size {
                session.frames_skipped += 1;
                tracing::warn!(
                    time_secs,
                    got = ?frame.dimensions(),
                    expected = ?expected_size,
                    "Skipping frame with unexpected size"
                );
                continue;
            }

            let boxes = match self.detector.detect(&frame).await {
                Ok(boxes) => boxes,
                Err(e) if e.is_recoverable() => {
                    session.frames_skipped += 1;
                    tracing::warn!(time_secs, error = %e, "Detection failed; skipping frame");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let subjects = classify(region, &boxes);
            match self.renderer.render(&mut frame, region, &subjects) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    session.frames_skipped += 1;
                    tracing::warn!(time_secs, error = %e, "Render failed; skipping frame");
                    continue;
                }
                Err(e) => return Err(e),
            }
            session.subjects.add(ClassificationSummary::from_boxes(&subjects));

            let buffer = FrameBuffer::from_rgb(&frame, sink.pixel_format());
            drop(frame);

            self.wait_for_ready(sink).await?;
            sink.push(buffer, time_secs).await?;
            session.frames_pushed += 1;

            if session.frames_pushed % progress_every == 0 {
                tracing::debug!(
                    frames_pushed = session.frames_pushed,
                    total_steps = session.total_steps,
                    time_secs,
                    "Streaming progress"
                );
                session.report();
            }
        }

        Ok(())
    }

    /// Suspend until the sink can take a frame, polling at the configured
    /// interval. Returns the number of polls that found it busy.
    async fn wait_for_ready(&self, sink: &mut dyn EncoderSink) -> HotzoneResult<u64> {
        let started = Instant::now();
        let mut busy_polls = 0u64;
        while !sink.is_ready() {
            let waited = started.elapsed();
            if waited >= self.settings.backpressure_timeout {
                return Err(HotzoneError::EncoderStalled {
                    waited_ms: waited.as_millis() as u64,
                });
            }
            busy_polls += 1;
            tokio::time::sleep(self.settings.backpressure_poll).await;
        }
        if busy_polls > 0 {
            tracing::trace!(busy_polls, "Encoder ready after backpressure");
        }
        Ok(busy_polls)
    }
}

/// Clear any previous output and make sure its directory exists.
fn prepare_output(output: &Path) -> HotzoneResult<()> {
    if output.exists() {
        tracing::debug!(output = %output.display(), "Removing previous output");
        std::fs::remove_file(output)?;
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Export a video file with the ffmpeg-backed source and encoder and the
/// default overlay.
pub async fn export_video(
    request: ExportRequest,
    detector: Arc<dyn SubjectDetector>,
    settings: ExportSettings,
    progress: Option<ProgressCallback>,
) -> HotzoneResult<ExportReport> {
    let source = FfmpegFrameSource::open(&request.input).await?;
    let pipeline = ExportPipeline::new(detector, Arc::new(OverlayRenderer::default()), settings);
    pipeline
        .run(&source, &FfmpegSinkFactory::default(), &request, progress)
        .await
}
