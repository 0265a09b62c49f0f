//! Raster frames, video track properties, and encoder buffers.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A decoded frame together with the source time it was taken from.
///
/// Sample frames are consumed by one detection/render step and then
/// dropped; nothing holds on to them.
#[derive(Debug, Clone)]
pub struct SampleFrame {
    /// Source timestamp in seconds.
    pub time_secs: f64,
    pub image: RgbImage,
}

impl SampleFrame {
    pub fn new(time_secs: f64, image: RgbImage) -> Self {
        Self { time_secs, image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Properties of the source video track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoTrackInfo {
    /// Natural (display) width in pixels.
    pub width: u32,
    /// Natural (display) height in pixels.
    pub height: u32,
    /// Nominal frame rate.
    pub frame_rate: f64,
    /// Track duration in seconds.
    pub duration_secs: f64,
}

impl VideoTrackInfo {
    pub fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Duration of one source frame, falling back to 1/30 s when the frame
    /// rate is unknown.
    pub fn frame_period_secs(&self) -> f64 {
        if self.frame_rate > 0.0 && self.frame_rate.is_finite() {
            1.0 / self.frame_rate
        } else {
            1.0 / 30.0
        }
    }
}

/// Packed pixel layouts an encoder sink can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 3 bytes per pixel, R G B.
    Rgb24,
    /// 4 bytes per pixel, B G R A, alpha opaque.
    Bgra32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 => 4,
        }
    }

    /// Name of the format as ffmpeg's `-pix_fmt` expects it.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgra32 => "bgra",
        }
    }
}

/// A rendered frame packed into the layout an encoder sink expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Pack an RGB image into `format`.
    pub fn from_rgb(image: &RgbImage, format: PixelFormat) -> Self {
        let (width, height) = image.dimensions();
        let data = match format {
            PixelFormat::Rgb24 => image.as_raw().clone(),
            PixelFormat::Bgra32 => {
                let mut out = Vec::with_capacity(width as usize * height as usize * 4);
                for px in image.as_raw().chunks_exact(3) {
                    out.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
                }
                out
            }
        };
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Expected byte length for the buffer's size and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}
