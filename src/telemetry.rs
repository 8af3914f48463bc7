//! Tracing setup for embedding applications.
//!
//! The library itself only emits `tracing` events; nothing here is wired
//! up implicitly. A host that wants the layer's logs calls [`init`] (or
//! [`try_init`] when something else may own the global subscriber).

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV_VAR: &str = "TETHER_LOG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Copy, Debug)]
pub struct TelemetryOptions {
    /// 0 = errors only, 1 = info, 2+ = debug. `TETHER_LOG` overrides.
    pub verbosity: u8,
    pub format: LogFormat,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            verbosity: 1,
            format: LogFormat::Compact,
        }
    }
}

pub fn is_test_env() -> bool {
    std::env::var_os("TETHER_TESTING").is_some()
        || std::env::var_os("RUST_TEST_THREADS").is_some()
}

/// Install the global subscriber. Panics if one is already set.
pub fn init(options: TelemetryOptions) {
    Registry::default().with(build_layers(options)).init();
}

/// Install the global subscriber unless one is already set.
pub fn try_init(options: TelemetryOptions) -> bool {
    Registry::default()
        .with(build_layers(options))
        .try_init()
        .is_ok()
}

fn build_layers(options: TelemetryOptions) -> Vec<Box<dyn Layer<Registry> + Send + Sync>> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(options.verbosity).into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(build_stderr_layer(options.format));
    layers.push(Box::new(filter));
    layers
}

fn build_stderr_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        ),
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::ERROR,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), tracing::metadata::LevelFilter::ERROR);
        assert_eq!(level_from_verbosity(1), tracing::metadata::LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2), tracing::metadata::LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(9), tracing::metadata::LevelFilter::DEBUG);
    }
}
