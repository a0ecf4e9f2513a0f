//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered inbound request
//!     → coordinator.rs (select target, bounded retry)
//!     → transport.rs (one upstream round trip with timeout)
//!     → on error: demote target in the registry, select again
//! ```
//!
//! # Design Decisions
//! - A forwarding error removes the target on the first failure
//! - Retries never wait; the next healthy target is tried immediately
//! - The body is buffered once so every attempt sends the same bytes

pub mod coordinator;
pub mod transport;

pub use coordinator::{ForwardOutcome, ForwardingCoordinator};
pub use transport::{ForwardError, HyperTransport, Transport, UpstreamRequest};
