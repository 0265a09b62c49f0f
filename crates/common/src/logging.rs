//! Logging and tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the tracing subscriber with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this twice is
/// harmless; the first subscriber stays installed.
pub fn init_logging(config: &LoggingConfig) {
    let installed = if config.json {
        fmt()
            .with_env_filter(env_filter(&config.level))
            .json()
            .with_current_span(true)
            .try_init()
    } else {
        fmt()
            .with_env_filter(env_filter(&config.level))
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Initialize logging with defaults (useful for quick scripts).
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}

/// Route logs through the libtest capture so they only show for failing
/// tests.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
