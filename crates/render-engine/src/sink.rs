//! Encoder sinks: where pass 2 pushes rendered frames.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use hotzone_common::clock::frame_slot;
use hotzone_common::error::{HotzoneError, HotzoneResult};
use hotzone_model::{FrameBuffer, PixelFormat};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Totals reported by a sink once it is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    /// Frames accepted through [`EncoderSink::push`].
    pub frames_pushed: u64,
    /// Frames handed to the encoder, including repeats that fill gaps.
    pub frames_written: u64,
}

/// A video encoder accepting timestamped frames in strictly increasing
/// order.
#[async_trait]
pub trait EncoderSink: Send {
    /// Layout every pushed buffer must use.
    fn pixel_format(&self) -> PixelFormat;

    /// Whether the encoder can take another frame right now.
    fn is_ready(&self) -> bool;

    /// Append a frame at presentation time `timestamp_secs`.
    ///
    /// Fails if the sink is not ready, if the timestamp does not increase,
    /// or if the buffer does not match the sink's size and format.
    async fn push(&mut self, frame: FrameBuffer, timestamp_secs: f64) -> HotzoneResult<()>;

    /// Flush and close the output.
    async fn finish(&mut self) -> HotzoneResult<SinkStats>;

    /// Abandon the output, releasing the encoder.
    async fn abort(&mut self);
}

/// Opens encoder sinks for an output file.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Open a sink writing `size` frames at a constant `fps` to `path`.
    async fn open(
        &self,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> HotzoneResult<Box<dyn EncoderSink>>;
}

/// Opens [`FfmpegEncoderSink`]s.
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    pub pixel_format: PixelFormat,
    /// Frames buffered between `push` and the encoder's stdin.
    pub queue_depth: usize,
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb24,
            queue_depth: 4,
        }
    }
}

#[async_trait]
impl SinkFactory for FfmpegSinkFactory {
    async fn open(
        &self,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> HotzoneResult<Box<dyn EncoderSink>> {
        let sink =
            FfmpegEncoderSink::spawn(path, size, fps, self.pixel_format, self.queue_depth)
                .await?;
        Ok(Box::new(sink))
    }
}

/// Build the ffmpeg argument list for a raw-video-in, H.264-out encode.
pub fn encoder_args(path: &Path, size: (u32, u32), fps: f64, format: PixelFormat) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        format.ffmpeg_name().to_string(),
        "-s".to_string(),
        format!("{}x{}", size.0, size.1),
        "-r".to_string(),
        format!("{fps}"),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

/// Maps pushed timestamps onto constant-rate presentation slots.
///
/// The first pushed timestamp is slot 0. Each later push reports how many
/// slots it skipped, which the sink fills by repeating the previous frame.
#[derive(Debug, Clone, Default)]
struct SlotTracker {
    origin_secs: Option<f64>,
    next_slot: u64,
}

impl SlotTracker {
    /// Claim the slot for `timestamp_secs`, returning the number of skipped
    /// slots before it.
    fn claim(&mut self, timestamp_secs: f64, fps: f64) -> u64 {
        let origin = *self.origin_secs.get_or_insert(timestamp_secs);
        let slot = frame_slot(timestamp_secs, origin, fps);
        let gap = slot.saturating_sub(self.next_slot);
        self.next_slot = slot.max(self.next_slot) + 1;
        gap
    }
}

/// Sink that pipes raw frames into an `ffmpeg` child process.
///
/// Frames travel through a bounded channel to a writer task that owns the
/// child's stdin, so readiness is simply spare channel capacity. The output
/// runs at a constant rate; when pushed timestamps skip presentation slots
/// the previous frame is repeated to keep the timeline frame-accurate.
pub struct FfmpegEncoderSink {
    path: PathBuf,
    size: (u32, u32),
    fps: f64,
    format: PixelFormat,
    child: Option<Child>,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr: Option<JoinHandle<String>>,
    slots: SlotTracker,
    last_timestamp: Option<f64>,
    last_frame: Option<Vec<u8>>,
    stats: SinkStats,
}

impl FfmpegEncoderSink {
    /// Start the encoder process.
    pub async fn spawn(
        path: &Path,
        size: (u32, u32),
        fps: f64,
        format: PixelFormat,
        queue_depth: usize,
    ) -> HotzoneResult<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(HotzoneError::sink(format!(
                "Cannot encode a {}x{} video",
                size.0, size.1
            )));
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(HotzoneError::sink(format!("Invalid output frame rate {fps}")));
        }
        if !crate::ffmpeg::command_exists("ffmpeg").await {
            return Err(HotzoneError::unsupported(
                "Encoding requires ffmpeg in PATH",
            ));
        }

        let mut child = tokio::process::Command::new("ffmpeg")
            .args(encoder_args(path, size, fps, format))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HotzoneError::sink(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HotzoneError::sink("ffmpeg stdin unavailable"))?;
        let stderr = child.stderr.take().map(|s| tokio::spawn(drain_stderr(s)));

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let writer = tokio::spawn(write_frames(stdin, rx));

        tracing::info!(
            output = %path.display(),
            width = size.0,
            height = size.1,
            fps,
            pixel_format = format.ffmpeg_name(),
            "Opened ffmpeg encoder"
        );

        Ok(Self {
            path: path.to_path_buf(),
            size,
            fps,
            format,
            child: Some(child),
            tx: Some(tx),
            writer: Some(writer),
            stderr,
            slots: SlotTracker::default(),
            last_timestamp: None,
            last_frame: None,
            stats: SinkStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn send(&mut self, bytes: Vec<u8>) -> HotzoneResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| HotzoneError::sink("Encoder already closed"))?;
        tx.send(bytes)
            .await
            .map_err(|_| HotzoneError::sink("Encoder writer stopped"))?;
        self.stats.frames_written += 1;
        Ok(())
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl EncoderSink for FfmpegEncoderSink {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn is_ready(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.capacity() > 0)
    }

    async fn push(&mut self, frame: FrameBuffer, timestamp_secs: f64) -> HotzoneResult<()> {
        if !self.is_ready() {
            return Err(HotzoneError::sink("Encoder is not ready for another frame"));
        }
        if let Some(last) = self.last_timestamp {
            if timestamp_secs <= last {
                return Err(HotzoneError::sink(format!(
                    "Timestamp {timestamp_secs:.3}s does not follow {last:.3}s"
                )));
            }
        }
        if frame.dimensions() != self.size || frame.format() != self.format {
            return Err(HotzoneError::sink(format!(
                "Frame is {}x{} {:?}, encoder expects {}x{} {:?}",
                frame.width(),
                frame.height(),
                frame.format(),
                self.size.0,
                self.size.1,
                self.format
            )));
        }
        if frame.as_bytes().len() != frame.expected_len() {
            return Err(HotzoneError::sink("Frame buffer length does not match its size"));
        }

        let gap = self.slots.claim(timestamp_secs, self.fps);
        if gap > 0 {
            if let Some(previous) = self.last_frame.clone() {
                tracing::debug!(
                    timestamp_secs,
                    repeated = gap,
                    "Filling skipped presentation slots"
                );
                for _ in 0..gap {
                    self.send(previous.clone()).await?;
                }
            }
        }

        let bytes = frame.into_bytes();
        self.last_frame = Some(bytes.clone());
        self.send(bytes).await?;
        self.last_timestamp = Some(timestamp_secs);
        self.stats.frames_pushed += 1;
        Ok(())
    }

    async fn finish(&mut self) -> HotzoneResult<SinkStats> {
        // Closing the channel ends the writer, which closes ffmpeg's stdin.
        self.tx.take();
        self.last_frame = None;

        if let Some(writer) = self.writer.take() {
            writer
                .await
                .map_err(|e| HotzoneError::sink(format!("Encoder writer panicked: {e}")))?
                .map_err(|e| HotzoneError::sink(format!("Failed to feed ffmpeg: {e}")))?;
        }

        let status = match self.child.take() {
            Some(mut child) => Some(
                child
                    .wait()
                    .await
                    .map_err(|e| HotzoneError::sink(format!("Failed to wait for ffmpeg: {e}")))?,
            ),
            None => None,
        };
        let stderr = self.collect_stderr().await;

        if let Some(status) = status {
            if !status.success() {
                return Err(HotzoneError::sink(format!(
                    "ffmpeg exited with {status}: {}",
                    stderr.trim()
                )));
            }
        }

        tracing::info!(
            output = %self.path.display(),
            frames_pushed = self.stats.frames_pushed,
            frames_written = self.stats.frames_written,
            "Encoder finished"
        );
        Ok(self.stats)
    }

    async fn abort(&mut self) {
        self.tx.take();
        self.last_frame = None;
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
        }
        let stderr = self.collect_stderr().await;
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "ffmpeg output before abort");
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(output = %self.path.display(), error = %e, "Failed to remove partial output");
            }
        }
        tracing::warn!(output = %self.path.display(), "Encoder aborted");
    }
}

async fn write_frames(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) -> std::io::Result<()> {
    while let Some(bytes) = rx.recv().await {
        stdin.write_all(&bytes).await?;
    }
    stdin.flush().await?;
    stdin.shutdown().await?;
    Ok(())
}

async fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut out = String::new();
    if let Err(e) = stderr.read_to_string(&mut out).await {
        tracing::debug!(error = %e, "Failed to read ffmpeg stderr");
    }
    out
}
