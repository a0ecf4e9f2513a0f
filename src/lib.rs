//! Round-robin reverse-proxy load balancer with health probing and failover.

pub mod config;
pub mod forwarding;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::BalancerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
