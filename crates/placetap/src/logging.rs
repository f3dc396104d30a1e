//! Process-wide tracing subscriber.
//!
//! `RUST_LOG` takes precedence over the configured level. Records emitted
//! through the `log` facade (the db layer) are forwarded into tracing.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{PlacetapError, Result};

/// Builds the filter directive for the configured level, keeping the HTTP
/// stack quiet unless explicitly asked for.
fn default_directives(level: &str) -> String {
    format!("{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn", level)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directives(&config.level))
            .map_err(|e| PlacetapError::Logging(format!("invalid log level: {}", e))),
    }
}

/// Installs the global subscriber. Call once at process start.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_log::LogTracer::init()
        .map_err(|e| PlacetapError::Logging(format!("log bridge: {}", e)))?;

    let filter = build_filter(config)?;

    let (plain, json) = match config.format {
        LogFormat::Plain => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        ),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PlacetapError::Logging(e.to_string()))
}
