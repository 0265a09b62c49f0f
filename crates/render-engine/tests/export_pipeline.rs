use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hotzone_common::error::{HotzoneError, HotzoneResult};
use hotzone_common::logging::init_test_logging;
use hotzone_model::{BoundingBox, FrameBuffer, PixelFormat, VideoTrackInfo};
use hotzone_processing::RegionOutcome;
use hotzone_render::{
    EncoderSink, ExportPipeline, ExportProgress, ExportReport, ExportRequest, ExportSettings,
    ExportStage, FrameSource, OverlayRenderer, SinkFactory, SinkStats, SubjectDetector,
};
use image::RgbImage;

const WIDTH: u32 = 8;
const HEIGHT: u32 = 6;

struct MockSource {
    duration_secs: f64,
    fail_track: bool,
    broken_at: Vec<f64>,
}

impl MockSource {
    fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            fail_track: false,
            broken_at: Vec::new(),
        }
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn duration_secs(&self) -> HotzoneResult<f64> {
        Ok(self.duration_secs)
    }

    async fn track_info(&self) -> HotzoneResult<VideoTrackInfo> {
        if self.fail_track {
            return Err(HotzoneError::source_stage("track properties", "no video track"));
        }
        Ok(VideoTrackInfo {
            width: WIDTH,
            height: HEIGHT,
            frame_rate: 30.0,
            duration_secs: self.duration_secs,
        })
    }

    async fn frame_at(&self, time_secs: f64, _tolerance_secs: f64) -> HotzoneResult<RgbImage> {
        if self.broken_at.iter().any(|t| (t - time_secs).abs() < 1e-9) {
            return Err(HotzoneError::frame_unavailable(time_secs, "corrupt packet"));
        }
        Ok(RgbImage::new(WIDTH, HEIGHT))
    }
}

/// Returns the same boxes every call, failing on the listed call numbers.
struct MockDetector {
    boxes: Vec<BoundingBox>,
    fail_calls: Vec<usize>,
    /// Calls that report the model itself as unusable.
    broken_calls: Vec<usize>,
    calls: AtomicUsize,
}

impl MockDetector {
    fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            fail_calls: Vec::new(),
            broken_calls: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SubjectDetector for MockDetector {
    async fn detect(&self, _frame: &RgbImage) -> HotzoneResult<Vec<BoundingBox>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.contains(&call) {
            return Err(HotzoneError::detection("model crashed"));
        }
        if self.broken_calls.contains(&call) {
            return Err(HotzoneError::unsupported("model weights missing"));
        }
        Ok(self.boxes.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct SinkLog {
    pushes: Mutex<Vec<f64>>,
    buffer_lens: Mutex<Vec<usize>>,
    busy_per_push: usize,
    always_busy: bool,
    busy_remaining: AtomicUsize,
    not_ready_polls: AtomicUsize,
    finished: AtomicBool,
    aborted: AtomicBool,
}

impl SinkLog {
    fn pushes(&self) -> Vec<f64> {
        self.pushes.lock().unwrap().clone()
    }
}

struct MockSink {
    log: Arc<SinkLog>,
}

#[async_trait]
impl EncoderSink for MockSink {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgra32
    }

    fn is_ready(&self) -> bool {
        if self.log.always_busy {
            self.log.not_ready_polls.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        let busy = self
            .log
            .busy_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if busy {
            self.log.not_ready_polls.fetch_add(1, Ordering::SeqCst);
        }
        !busy
    }

    async fn push(&mut self, frame: FrameBuffer, timestamp_secs: f64) -> HotzoneResult<()> {
        let mut pushes = self.log.pushes.lock().unwrap();
        if let Some(last) = pushes.last() {
            if timestamp_secs <= *last {
                return Err(HotzoneError::sink("timestamps went backwards"));
            }
        }
        pushes.push(timestamp_secs);
        self.log.buffer_lens.lock().unwrap().push(frame.as_bytes().len());
        self.log
            .busy_remaining
            .store(self.log.busy_per_push, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&mut self) -> HotzoneResult<SinkStats> {
        self.log.finished.store(true, Ordering::SeqCst);
        let pushed = self.log.pushes.lock().unwrap().len() as u64;
        Ok(SinkStats {
            frames_pushed: pushed,
            frames_written: pushed,
        })
    }

    async fn abort(&mut self) {
        self.log.aborted.store(true, Ordering::SeqCst);
    }
}

struct MockFactory {
    log: Arc<SinkLog>,
    fail_open: bool,
    opened_with: Mutex<Option<((u32, u32), f64)>>,
}

impl MockFactory {
    fn new(log: SinkLog) -> Self {
        Self {
            log: Arc::new(log),
            fail_open: false,
            opened_with: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SinkFactory for MockFactory {
    async fn open(
        &self,
        _path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> HotzoneResult<Box<dyn EncoderSink>> {
        if self.fail_open {
            return Err(HotzoneError::sink("encoder refused the output"));
        }
        *self.opened_with.lock().unwrap() = Some((size, fps));
        Ok(Box::new(MockSink {
            log: self.log.clone(),
        }))
    }
}

fn settings() -> ExportSettings {
    ExportSettings {
        backpressure_poll: Duration::from_millis(1),
        ..ExportSettings::default()
    }
}

fn pipeline_with(detector: MockDetector, settings: ExportSettings) -> ExportPipeline {
    ExportPipeline::new(
        Arc::new(detector),
        Arc::new(OverlayRenderer::default()),
        settings,
    )
}

fn centered_subject() -> BoundingBox {
    BoundingBox::new(0.4, 0.3, 0.6, 0.5)
}

fn request_in(dir: &tempfile::TempDir) -> ExportRequest {
    ExportRequest::new(dir.path().join("input.mp4"), dir.path().join("out.mp4"))
}

#[tokio::test]
async fn pushes_every_step_in_order_and_omits_unreadable_frames() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        broken_at: vec![1.0],
        ..MockSource::new(2.0)
    };
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(MockDetector::new(vec![centered_subject()]), settings());

    let report = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();

    assert_eq!(factory.log.pushes(), vec![0.0, 0.5, 1.5]);
    assert_eq!(report.frames_pushed, 3);
    assert_eq!(report.frames_skipped, 1);
    assert_eq!(report.sampled_frames, 1);
    assert!(factory.log.finished.load(Ordering::SeqCst));
    assert!(!factory.log.aborted.load(Ordering::SeqCst));
    assert_eq!(*factory.opened_with.lock().unwrap(), Some(((WIDTH, HEIGHT), 2.0)));

    let expected_len = (WIDTH * HEIGHT * 4) as usize;
    assert!(factory
        .log
        .buffer_lens
        .lock()
        .unwrap()
        .iter()
        .all(|len| *len == expected_len));
}

#[tokio::test]
async fn export_window_limits_the_streamed_range() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(10.0);
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());

    pipeline
        .run(&source, &factory, &request_in(&dir).with_window(3.0, 1.5), None)
        .await
        .unwrap();

    assert_eq!(factory.log.pushes(), vec![3.0, 3.5, 4.0]);
}

#[tokio::test]
async fn detection_failure_skips_only_that_frame() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    // Call 0 is the single pass-1 sample; call 2 is the frame at 0.5s.
    let detector = MockDetector {
        fail_calls: vec![2],
        ..MockDetector::new(vec![centered_subject()])
    };
    let pipeline = pipeline_with(detector, settings());

    let report = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();

    assert_eq!(factory.log.pushes(), vec![0.0, 1.0, 1.5]);
    assert_eq!(report.frames_skipped, 1);
}

#[tokio::test]
async fn unusable_detector_aborts_the_export() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    let detector = MockDetector {
        broken_calls: vec![2],
        ..MockDetector::new(Vec::new())
    };
    let pipeline = pipeline_with(detector, settings());

    let err = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HotzoneError::Unsupported { .. }));
    assert_eq!(factory.log.pushes(), vec![0.0]);
    assert!(factory.log.aborted.load(Ordering::SeqCst));
    assert!(!factory.log.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unusable_detector_during_sampling_fails_before_the_sink_opens() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    let detector = MockDetector {
        broken_calls: vec![0],
        ..MockDetector::new(Vec::new())
    };
    let pipeline = pipeline_with(detector, settings());

    let err = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HotzoneError::Unsupported { .. }));
    assert!(factory.opened_with.lock().unwrap().is_none());
}

#[tokio::test]
async fn backpressure_waits_and_never_drops() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog {
        busy_per_push: 3,
        ..SinkLog::default()
    });
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());

    let report = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();

    assert_eq!(factory.log.pushes(), vec![0.0, 0.5, 1.0, 1.5]);
    assert_eq!(report.frames_pushed, 4);
    // Busy for three polls after each of the first three pushes.
    assert_eq!(factory.log.not_ready_polls.load(Ordering::SeqCst), 9);
}

#[tokio::test]
async fn stalled_encoder_is_fatal_and_aborted() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog {
        always_busy: true,
        ..SinkLog::default()
    });
    let pipeline = pipeline_with(
        MockDetector::new(Vec::new()),
        ExportSettings {
            backpressure_timeout: Duration::from_millis(30),
            ..settings()
        },
    );

    let err = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HotzoneError::EncoderStalled { .. }));
    assert!(factory.log.pushes().is_empty());
    assert!(factory.log.aborted.load(Ordering::SeqCst));
    assert!(!factory.log.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_track_properties_fail_before_the_sink_opens() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        fail_track: true,
        ..MockSource::new(2.0)
    };
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = stages.clone();
    let err = pipeline
        .run(
            &source,
            &factory,
            &request_in(&dir),
            Some(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p.stage))),
        )
        .await
        .unwrap_err();

    match err {
        HotzoneError::Source { stage, .. } => assert_eq!(stage, "init"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(factory.opened_with.lock().unwrap().is_none());
    assert_eq!(
        stages.lock().unwrap().last().copied(),
        Some(ExportStage::Failed)
    );
}

#[tokio::test]
async fn sink_open_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory {
        fail_open: true,
        ..MockFactory::new(SinkLog::default())
    };
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());

    let err = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HotzoneError::Sink { .. }));
    assert!(factory.log.pushes().is_empty());
}

#[tokio::test]
async fn previous_output_is_removed_and_parent_created() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("out.mp4");
    std::fs::write(&stale, b"old render").unwrap();

    let source = MockSource::new(1.0);
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());
    pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();
    assert!(!stale.exists());

    let nested = ExportRequest::new(
        dir.path().join("input.mp4"),
        dir.path().join("renders/today/out.mp4"),
    );
    pipeline
        .run(&source, &MockFactory::new(SinkLog::default()), &nested, None)
        .await
        .unwrap();
    assert!(dir.path().join("renders/today").is_dir());
}

#[tokio::test]
async fn region_follows_activity_and_classifies_outliers() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    // The second subject sits in the top rows, which the search band skips.
    let detector = MockDetector::new(vec![
        centered_subject(),
        BoundingBox::new(0.0, 0.9, 0.1, 1.0),
    ]);
    let pipeline = pipeline_with(detector, settings());

    let report = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();

    assert_eq!(report.region_outcome, RegionOutcome::Hot);
    let region = report.region;
    assert!((region.min_x() - 0.37).abs() < 1e-9);
    assert!((region.max_x() - 0.63).abs() < 1e-9);
    assert!((region.min_y() - 0.22).abs() < 1e-9);
    assert!((region.max_y() - 0.58).abs() < 1e-9);
    assert_eq!(report.subjects_in, 4);
    assert_eq!(report.subjects_out, 4);
}

#[tokio::test]
async fn no_detections_fall_back_to_default_region() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(MockDetector::new(Vec::new()), settings());

    let report = pipeline
        .run(&source, &factory, &request_in(&dir), None)
        .await
        .unwrap();

    assert_eq!(report.region_outcome, RegionOutcome::NoSignal);
    assert!((report.region.min_y() - 0.25).abs() < 1e-9);
    assert!((report.region.max_y() - 0.70).abs() < 1e-9);
}

#[tokio::test]
async fn progress_walks_every_stage_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(2.0);
    let factory = MockFactory::new(SinkLog::default());
    let pipeline = pipeline_with(
        MockDetector::new(Vec::new()),
        ExportSettings {
            progress_every: 1,
            write_report: true,
            ..settings()
        },
    );

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = stages.clone();
    let request = request_in(&dir);
    pipeline
        .run(
            &source,
            &factory,
            &request,
            Some(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p.stage))),
        )
        .await
        .unwrap();

    let mut stages = stages.lock().unwrap().clone();
    stages.dedup();
    assert_eq!(
        stages,
        vec![
            ExportStage::Init,
            ExportStage::Sampling,
            ExportStage::Estimating,
            ExportStage::OpeningSink,
            ExportStage::Streaming,
            ExportStage::Finalizing,
            ExportStage::Complete,
        ]
    );

    let report_path = ExportReport::report_path(&request.output);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(json["frames_pushed"], 4);
    assert_eq!(json["region_outcome"], "no_signal");
}
