//! Error types shared across Hotzone crates.

use std::path::PathBuf;

/// Top-level error type for Hotzone operations.
#[derive(Debug, thiserror::Error)]
pub enum HotzoneError {
    #[error("Source error during {stage}: {message}")]
    Source { stage: String, message: String },

    #[error("Frame unavailable at {time_secs:.3}s: {message}")]
    FrameUnavailable { time_secs: f64, message: String },

    #[error("Detection error: {message}")]
    Detection { message: String },

    #[error("Encoder sink error: {message}")]
    Sink { message: String },

    #[error("Encoder sink did not become ready within {waited_ms} ms")]
    EncoderStalled { waited_ms: u64 },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using HotzoneError.
pub type HotzoneResult<T> = Result<T, HotzoneError>;

impl HotzoneError {
    pub fn source_stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    pub fn frame_unavailable(time_secs: f64, msg: impl Into<String>) -> Self {
        Self::FrameUnavailable {
            time_secs,
            message: msg.into(),
        }
    }

    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection {
            message: msg.into(),
        }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the export loop may skip the current step and continue.
    ///
    /// Only per-frame fetch, detection and render failures qualify; anything
    /// else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FrameUnavailable { .. } | Self::Detection { .. } | Self::Render { .. }
        )
    }
}
