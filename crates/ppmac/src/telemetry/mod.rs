//! Logging setup for the console binary.

use ppmac_config::LoggingConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub fn log_level(config: &LoggingConfig) -> Level {
    if cfg!(debug_assertions) || config.debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `RUST_LOG` when set, otherwise every `ppmac*` target at `level`.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&format!("ppmac={}", level))
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()))
    })
}

/// Installs the global subscriber. Logs go to stderr so that command output
/// on stdout stays clean.
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TryInitError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(config.use_color)
        .with_target(config.show_target);

    let fmt_layer = if config.show_timestamp {
        fmt_layer.boxed()
    } else {
        fmt_layer.without_time().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(log_level(config)))
        .with(fmt_layer)
        .try_init()
}
