//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    routing::any,
    Router,
};
use failover_proxy::config::BalancerConfig;
use failover_proxy::load_balancer::TargetRegistry;
use failover_proxy::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A running mock backend.
#[allow(dead_code)]
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a backend on an ephemeral port that answers with its name.
#[allow(dead_code)]
pub async fn start_mock_backend(name: &'static str) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_mock(listener, name)
}

/// Start a backend on a specific address (e.g. one that was down before).
#[allow(dead_code)]
pub async fn start_mock_backend_on(addr: SocketAddr, name: &'static str) -> MockBackend {
    let listener = TcpListener::bind(addr).await.unwrap();
    serve_mock(listener, name)
}

fn serve_mock(listener: TcpListener, name: &'static str) -> MockBackend {
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    // Replies "<name>" or, when a body was sent, "<name>:<body>".
    async fn reply(State((name, hits)): State<(&'static str, Arc<AtomicUsize>)>, body: String) -> String {
        hits.fetch_add(1, Ordering::SeqCst);
        if body.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", name, body)
        }
    }

    let app = Router::new()
        .route("/", any(reply))
        .route("/{*path}", any(reply))
        .with_state((name, hits.clone()));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, hits }
}

/// What a recording backend saw for one request.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub path_and_query: String,
    pub headers: HeaderMap,
}

/// A backend that keeps every request it receives.
#[allow(dead_code)]
pub struct RecordingBackend {
    pub addr: SocketAddr,
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

#[allow(dead_code)]
impl RecordingBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[allow(dead_code)]
pub async fn start_recording_backend() -> RecordingBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    async fn record(State(seen): State<Arc<Mutex<Vec<Seen>>>>, uri: Uri, headers: HeaderMap) -> &'static str {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        seen.lock().unwrap().push(Seen {
            path_and_query,
            headers,
        });
        "recorded"
    }

    let app = Router::new()
        .route("/", any(record))
        .route("/{*path}", any(record))
        .with_state(seen.clone());

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    RecordingBackend { addr, seen }
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn unused_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap()
}

/// A running balancer.
#[allow(dead_code)]
pub struct Proxy {
    pub addr: SocketAddr,
    pub registry: Arc<TargetRegistry>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl Proxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with the given targets, listening on an ephemeral port.
#[allow(dead_code)]
pub fn config(targets: &[String]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.targets = targets.to_vec();
    config.health_check.enabled = false;
    config.health_check.timeout_ms = 200;
    config.forwarding.timeout_ms = 2000;
    config
}

/// Start the balancer in the background.
#[allow(dead_code)]
pub async fn start_proxy(config: BalancerConfig) -> Proxy {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let registry = server.registry();
    let shutdown = Shutdown::new();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    Proxy {
        addr,
        registry,
        shutdown,
    }
}

/// HTTP client that never pools or uses system proxies.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses.
#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
