//! Hotzone Common Utilities
//!
//! Shared infrastructure for all Hotzone crates:
//! - Error types and result aliases
//! - Presentation-time arithmetic for sampling and export stepping
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
