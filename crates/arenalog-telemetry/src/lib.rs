//! Logging initialization for the arenalog binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Parse a level name, falling back to INFO on nonsense.
    pub fn with_level(level: &str) -> Self {
        Self {
            log_level: level.parse().unwrap_or(Level::INFO),
        }
    }
}

/// Initialize the tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) {
    let default_filter = config.log_level.to_string().to_lowercase();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
