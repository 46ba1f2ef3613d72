//! Telemetry and Observability
//!
//! `tracing-subscriber` setup for the CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber using `log_level` unless `RUST_LOG` is set.
///
/// Debug builds write pretty output to stderr, release builds write JSON.
/// Logs go to stderr so answers printed on stdout stay machine-readable.
/// Only the first successful call takes effect.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = format!("{},legal_mind_engine={},sqlx=warn", log_level, log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
