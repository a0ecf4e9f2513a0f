//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by outcome
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_target_removals_total` (counter): demotions after forwarding errors
//! - `balancer_healthy_targets` (gauge): size of the healthy subset
//! - `balancer_health_checks_total` (counter): probe results by target
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the Prometheus recorder.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("balancer_requests_total", "outcome" => outcome).increment(1);
    histogram!("balancer_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record a target demoted by the forwarding path.
pub fn record_target_removal(target: &str) {
    counter!("balancer_target_removals_total", "target" => target.to_string()).increment(1);
}

/// Record the result of a single probe.
pub fn record_probe(target: &str, healthy: bool) {
    let result = if healthy { "up" } else { "down" };
    counter!("balancer_health_checks_total", "target" => target.to_string(), "result" => result)
        .increment(1);
}

/// Publish the current healthy-set size.
pub fn record_healthy_targets(count: usize) {
    gauge!("balancer_healthy_targets").set(count as f64);
}
