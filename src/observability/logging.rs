//! Structured logging.
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity without editing the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to `default_level`.
///
/// A bare level such as `debug` is scoped to this crate and tower-http;
/// anything else is used as a full filter directive.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if default_level.contains('=') || default_level.contains(',') {
            default_level.to_string()
        } else {
            format!("failover_proxy={0},echo_backend={0},tower_http={0}", default_level)
        };
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
