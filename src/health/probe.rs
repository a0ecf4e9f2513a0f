//! Liveness probes.
//!
//! # Responsibilities
//! - Decide whether a single target is reachable right now
//! - Bound every probe with a timeout
//!
//! Any HTTP response counts as reachable; only connection errors and
//! timeouts make a target unhealthy.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::load_balancer::Target;

/// Reachability check against one target.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &Target) -> bool;
}

/// HTTP GET probe.
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(config: &HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            client,
            path: config.path.clone(),
            timeout: config.timeout(),
        }
    }

    fn probe_uri(&self, target: &Target) -> String {
        format!("{}{}", target.address(), self.path)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, target: &Target) -> bool {
        let request = match Request::builder()
            .method("GET")
            .uri(self.probe_uri(target))
            .header(header::USER_AGENT, "failover-proxy-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(upstream = %target, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                if !response.status().is_success() {
                    tracing::debug!(upstream = %target, status = %response.status(), "Health check answered with non-success status");
                }
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(upstream = %target, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(upstream = %target, timeout = ?self.timeout, "Health check failed: timeout");
                false
            }
        }
    }
}
