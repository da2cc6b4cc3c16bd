//! Logging setup, powered by tracing-subscriber.
//!
//! Library code logs through both `log::*` and `tracing`. A
//! `tracing_log::LogTracer` bridge routes the `log` records into the same
//! subscriber.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Noisy dependency targets capped regardless of the configured level.
const QUIET_TARGETS: &[(&str, &str)] = &[("rusqlite", "warn"), ("tokio", "warn")];

/// Builds the filter from the configured level. `RUST_LOG`, when set,
/// takes precedence.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str).map_err(|e| ConfigError::Validation {
        message: format!("Invalid log filter '{}': {}", filter_str, e),
    })
}

/// Installs the global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed, e.g. by the
/// host process or an earlier call.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = build_env_filter(&config.level)?;

    tracing_log::LogTracer::init().ok();

    let layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_span_list(true)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter)
            .boxed()
    };

    // LogTracer is installed above; set_global_default leaves it alone.
    let subscriber = tracing_subscriber::registry().with(layer);
    let installed = tracing::subscriber::set_global_default(subscriber).is_ok();
    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    }
    Ok(installed)
}
