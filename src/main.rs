//! failover-proxy
//!
//! A round-robin reverse proxy that demotes failing targets and retries
//! requests on the remaining healthy ones.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                   FAILOVER PROXY                      │
//!                   │                                                       │
//!   Client Request  │  ┌─────────┐   ┌─────────────┐   ┌───────────────┐   │
//!   ────────────────┼─▶│  http   │──▶│ forwarding  │──▶│ load_balancer │   │
//!                   │  │ server  │   │ coordinator │◀──│  round robin  │   │
//!                   │  └─────────┘   └──────┬──────┘   └───────┬───────┘   │
//!                   │                       │ error: remove    │           │
//!                   │                       ▼                  ▼           │
//!   Client Response │               ┌─────────────┐    ┌──────────────┐    │
//!   ◀───────────────┼───────────────│  transport  │    │   registry   │◀─┐ │
//!                   │               └──────┬──────┘    └──────────────┘  │ │
//!                   │                      │                  replace    │ │
//!                   │                      ▼              ┌────────────┐ │ │
//!                   │                  Targets ◀──probe───│   health   │─┘ │
//!                   │                                     │  monitor   │   │
//!                   │                                     └────────────┘   │
//!                   └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use failover_proxy::config::{load_config, validate_config, BalancerConfig, ConfigError};
use failover_proxy::lifecycle::startup;
use failover_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "failover-proxy")]
#[command(about = "Round-robin HTTP load balancer with health checks and failover", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides listener.bind_address).
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on (replaces the port of --bind or the configured address).
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream target; repeat for several (replaces the configured list).
    #[arg(short, long = "target")]
    targets: Vec<String>,

    /// Milliseconds between health check cycles.
    #[arg(long)]
    health_interval_ms: Option<u64>,

    /// Log level or filter directive (RUST_LOG still wins).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<BalancerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BalancerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.listener.bind_address = with_port(&config.listener.bind_address, port);
        }
        if !self.targets.is_empty() {
            config.targets = self.targets;
        }
        if let Some(interval) = self.health_interval_ms {
            config.health_check.interval_ms = interval;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Swap the port of `bind`, keeping its host. Unparsable addresses fall
/// back to all interfaces.
fn with_port(bind: &str, port: u16) -> String {
    match bind.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => format!("0.0.0.0:{}", port),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability.log_level);

    tracing::info!("failover-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        targets = ?config.targets,
        health_checks = config.health_check.enabled,
        health_interval_ms = config.health_check.interval_ms,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
