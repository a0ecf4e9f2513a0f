//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Build the registry, selector, transport and health monitor
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::BalancerConfig;
use crate::forwarding::{ForwardingCoordinator, HyperTransport, Transport, UpstreamRequest};
use crate::health::{HealthMonitor, HttpProbe, Probe};
use crate::http::{request, response};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{RoundRobin, Target, TargetError, TargetRegistry};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ForwardingCoordinator>,
    pub max_body_bytes: usize,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    registry: Arc<TargetRegistry>,
    probe: Arc<dyn Probe>,
}

impl HttpServer {
    /// Create a server that forwards over HTTP and probes with HTTP GETs.
    pub fn new(config: BalancerConfig) -> Result<Self, TargetError> {
        let transport = Arc::new(HyperTransport::new(config.forwarding.timeout()));
        let probe = Arc::new(HttpProbe::new(&config.health_check));
        Self::with_collaborators(config, transport, probe)
    }

    /// Create a server with explicit transport and probe implementations.
    pub fn with_collaborators(
        config: BalancerConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn Probe>,
    ) -> Result<Self, TargetError> {
        let targets = config
            .targets
            .iter()
            .map(|t| Target::parse(t))
            .collect::<Result<Vec<_>, _>>()?;

        let registry = Arc::new(TargetRegistry::new(targets));
        let balancer = Arc::new(RoundRobin::new(registry.clone()));
        let coordinator = Arc::new(ForwardingCoordinator::new(
            balancer,
            registry.clone(),
            transport,
            config.forwarding.max_attempts,
        ));

        let state = AppState {
            coordinator,
            max_body_bytes: config.forwarding.max_body_bytes,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            registry,
            probe,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(request::MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Shared registry (for inspection and tests).
    pub fn registry(&self) -> Arc<TargetRegistry> {
        self.registry.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns after `shutdown` is triggered and in-flight requests drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            targets = self.registry.all_targets().len(),
            "HTTP server starting"
        );
        metrics::record_healthy_targets(self.registry.healthy_count());

        let monitor = if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.registry.clone(),
                self.probe.clone(),
                self.config.health_check.interval(),
            );
            Some(tokio::spawn(monitor.run(shutdown.subscribe())))
        } else {
            tracing::info!("Active health checks disabled");
            None
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let stop = shutdown.clone();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        // Also stops the monitor if serving ended on an error.
        shutdown.trigger();
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Buffers the request, then hands it to the forwarding coordinator.
async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request::request_id(&req);
    request::log_request(&req, &request_id);
    let client_addr = request::client_addr(&req);

    let (parts, body) = req.into_parts();
    let body = match request::read_body(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejecting request body");
            metrics::record_request("rejected", start);
            return response::from_body_error(&e);
        }
    };

    let upstream = UpstreamRequest::new(parts.method, &parts.uri, parts.headers, body)
        .with_client_addr(client_addr);

    let outcome = state.coordinator.handle(upstream).await;
    let (reply, label) = response::from_outcome(outcome);

    tracing::debug!(
        request_id = %request_id,
        status = reply.status().as_u16(),
        outcome = label,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request complete"
    );
    metrics::record_request(label, start);
    reply
}
