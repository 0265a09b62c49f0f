//! Shared helpers for driving the `ffmpeg` / `ffprobe` binaries.

use std::path::Path;
use std::process::Stdio;

use hotzone_common::error::{HotzoneError, HotzoneResult};
use serde::Deserialize;

/// Whether `binary` can be launched, checked by running `binary -version`.
pub async fn command_exists(binary: &str) -> bool {
    tokio::process::Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

/// What `ffprobe` reported about a media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Container duration, falling back to the video stream duration.
    pub duration_secs: Option<f64>,
    /// First video stream, if any.
    pub video: Option<VideoStreamInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMediaInfo {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    duration: Option<String>,
}

/// Run `ffprobe` on `path` and parse its JSON report.
pub async fn inspect(path: &Path) -> HotzoneResult<MediaInfo> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| HotzoneError::source_stage("inspect", format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(HotzoneError::source_stage(
            "inspect",
            format!(
                "ffprobe failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    parse_media_info(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the JSON emitted by the `ffprobe` call in [`inspect`].
pub fn parse_media_info(raw: &str) -> HotzoneResult<MediaInfo> {
    let parsed: RawMediaInfo = serde_json::from_str(raw)?;

    let stream = parsed.streams.into_iter().next();
    let stream_duration = stream
        .as_ref()
        .and_then(|s| s.duration.as_deref())
        .and_then(parse_seconds);
    let format_duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);

    let video = stream.and_then(|s| {
        let width = s.width.filter(|w| *w > 0)?;
        let height = s.height.filter(|h| *h > 0)?;
        let frame_rate = s
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rate));
        Some(VideoStreamInfo {
            width,
            height,
            frame_rate,
        })
    });

    Ok(MediaInfo {
        duration_secs: format_duration.or(stream_duration),
        video,
    })
}

fn parse_seconds(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse an ffmpeg rational such as `30000/1001` or `25`.
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
