//! Minimal upstream for trying the balancer locally.
//!
//! Logs the metadata of every request it receives and answers with the
//! port it listens on, so responses show which target served them.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Uri, Version},
    routing::any,
    Router,
};
use clap::Parser;
use std::net::SocketAddr;

use failover_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "echo-backend")]
#[command(about = "Test backend that echoes request metadata", long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8001)]
    port: u16,
}

async fn echo(
    State(port): State<u16>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
) -> String {
    tracing::info!(
        remote_ip = %remote.ip(),
        remote_port = remote.port(),
        method = %method,
        path = %uri.path(),
        version = ?version,
        "Received request"
    );
    for (name, value) in &headers {
        tracing::info!(header = %name, value = ?value, "Request header");
    }

    tracing::info!("Replied with hello message");
    format!("Hello from port {}\n", port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init("info");

    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo))
        .with_state(cli.port);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Echo backend listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
