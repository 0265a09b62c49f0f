//! Hotzone Render Engine
//!
//! Two-pass export pipeline that finds where the action is in a video and
//! renders every frame of a time window with that region and its subjects
//! outlined.
//!
//! # Pipeline Architecture
//!
//! ```text
//!                 pass 1 (coarse)                     pass 2 (dense)
//! source ──┬── sample every 10s ──┐        ┌── frame every 0.5s
//!          │        │             │        │        │
//!          │     detect           │        │     detect ── classify IN/OUT
//!          │        │             │        │        │
//!          │   activity grid ─ estimate region ─── overlay
//!          │                                        │
//!          └────────────────────────────────────  encode (H.264, backpressure)
//!                                                   │
//!                                                   ▼
//!                                               output.mp4
//! ```
//!
//! Collaborators sit behind traits so the pipeline runs the same against
//! ffmpeg or in-memory fakes:
//! - [`FrameSource`]: random-access decoding
//! - [`SubjectDetector`]: object detection
//! - [`FrameRenderer`]: overlay drawing
//! - [`SinkFactory`] / [`EncoderSink`]: encoding with a readiness signal

pub mod detector;
pub mod export;
pub mod ffmpeg;
pub mod renderer;
pub mod sampler;
pub mod sink;
pub mod source;

pub use detector::SubjectDetector;
pub use export::*;
pub use renderer::{FrameRenderer, OverlayRenderer, OverlayStyle};
pub use sampler::{FrameSampler, SampleRun, SamplerConfig};
pub use sink::{EncoderSink, FfmpegEncoderSink, FfmpegSinkFactory, SinkFactory, SinkStats};
pub use source::{FfmpegFrameSource, FrameSource};
