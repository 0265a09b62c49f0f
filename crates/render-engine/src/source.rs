//! Frame sources: where pass 1 and pass 2 pull decoded frames from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hotzone_common::error::{HotzoneError, HotzoneResult};
use hotzone_model::VideoTrackInfo;
use image::RgbImage;
use tokio::sync::OnceCell;

use crate::ffmpeg::{self, MediaInfo};

/// Random-access frame decoding for one video asset.
///
/// Every call may suspend while the underlying decoder works.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Duration of the asset in seconds.
    async fn duration_secs(&self) -> HotzoneResult<f64>;

    /// Natural size, frame rate and duration of the video track.
    async fn track_info(&self) -> HotzoneResult<VideoTrackInfo>;

    /// Decode the frame at `time_secs`, accepting a frame up to
    /// `tolerance_secs` away from the requested time.
    async fn frame_at(&self, time_secs: f64, tolerance_secs: f64) -> HotzoneResult<RgbImage>;
}

/// Frame source backed by the `ffmpeg` and `ffprobe` binaries.
///
/// Each fetch runs one short `ffmpeg` process that seeks to the requested
/// time and emits a single raw RGB24 frame on stdout. The asset is inspected
/// once and the result cached.
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: OnceCell<MediaInfo>,
}

impl FfmpegFrameSource {
    /// Open `path` for decoding.
    pub async fn open(path: impl AsRef<Path>) -> HotzoneResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(HotzoneError::FileNotFound { path });
        }
        if !ffmpeg::command_exists("ffmpeg").await || !ffmpeg::command_exists("ffprobe").await {
            return Err(HotzoneError::unsupported(
                "Frame decoding requires ffmpeg and ffprobe in PATH",
            ));
        }
        Ok(Self {
            path,
            info: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn media_info(&self) -> HotzoneResult<&MediaInfo> {
        self.info
            .get_or_try_init(|| async {
                let info = ffmpeg::inspect(&self.path).await?;
                tracing::debug!(
                    path = %self.path.display(),
                    duration_secs = ?info.duration_secs,
                    has_video = info.video.is_some(),
                    "Inspected source"
                );
                Ok::<_, HotzoneError>(info)
            })
            .await
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn duration_secs(&self) -> HotzoneResult<f64> {
        self.media_info()
            .await?
            .duration_secs
            .ok_or_else(|| HotzoneError::source_stage("duration", "Source duration is unavailable"))
    }

    async fn track_info(&self) -> HotzoneResult<VideoTrackInfo> {
        let info = self.media_info().await?;
        let video = info.video.ok_or_else(|| {
            HotzoneError::source_stage("track properties", "Source has no video track")
        })?;
        let duration_secs = info.duration_secs.ok_or_else(|| {
            HotzoneError::source_stage("track properties", "Source duration is unavailable")
        })?;
        Ok(VideoTrackInfo {
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate.unwrap_or(0.0),
            duration_secs,
        })
    }

    async fn frame_at(&self, time_secs: f64, tolerance_secs: f64) -> HotzoneResult<RgbImage> {
        let info = self
            .track_info()
            .await
            .map_err(|e| HotzoneError::frame_unavailable(time_secs, e.to_string()))?;
        let seek = resolve_seek_time(&info, time_secs, tolerance_secs)
            .ok_or_else(|| HotzoneError::frame_unavailable(time_secs, "Outside source duration"))?;

        let output = tokio::process::Command::new("ffmpeg")
            .args(decode_args(&self.path, seek))
            .output()
            .await
            .map_err(|e| {
                HotzoneError::frame_unavailable(time_secs, format!("Failed to start ffmpeg: {e}"))
            })?;

        if !output.status.success() {
            return Err(HotzoneError::frame_unavailable(
                time_secs,
                format!(
                    "ffmpeg decode failed (status {}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let expected = info.width as usize * info.height as usize * 3;
        if output.stdout.len() != expected {
            return Err(HotzoneError::frame_unavailable(
                time_secs,
                format!(
                    "Decoded {} bytes, expected {expected} for {}x{}",
                    output.stdout.len(),
                    info.width,
                    info.height
                ),
            ));
        }

        RgbImage::from_raw(info.width, info.height, output.stdout)
            .ok_or_else(|| HotzoneError::frame_unavailable(time_secs, "Malformed raw frame"))
    }
}

/// Arguments that decode the single frame at `seek_secs` as raw RGB24.
///
/// Display-matrix rotation is not applied, so the frame keeps the stored
/// size that `ffprobe` reports for the stream.
fn decode_args(path: &Path, seek_secs: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-noautorotate".to_string(),
        "-ss".to_string(),
        format!("{seek_secs:.6}"),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]
}

/// Map a requested time onto a decodable seek position.
///
/// Requests within `tolerance_secs` past the last frame snap back onto it;
/// anything further out (or negative beyond tolerance) has no frame.
fn resolve_seek_time(info: &VideoTrackInfo, time_secs: f64, tolerance_secs: f64) -> Option<f64> {
    if !time_secs.is_finite() {
        return None;
    }
    let tolerance = tolerance_secs.max(0.0);
    let last_frame = (info.duration_secs - info.frame_period_secs()).max(0.0);
    if time_secs < -tolerance || time_secs > last_frame + tolerance {
        return None;
    }
    Some(time_secs.clamp(0.0, last_frame))
}
