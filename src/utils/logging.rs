// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Sets up diagnostic logging using tracing_subscriber.
/// Reads log level filters from the `RUST_LOG` environment variable,
/// falling back to `default_level` when it is unset or invalid.
/// Output goes to stderr so stdout stays free for reconciliation summaries.
pub fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("Logging setup complete.");
}
