//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging.
///
/// JSON output when `RUST_ENV=production`, pretty output otherwise.
/// The filter defaults to `info` globally and `debug` for desk crates,
/// overridable via `RUST_LOG`.
pub fn init_logging() -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,desk=debug"));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .map_err(|e| TelemetryError::Logging(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
            .map_err(|e| TelemetryError::Logging(e.to_string()))?;
    }

    Ok(())
}
