//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → round_robin.rs (advance cursor, read healthy snapshot)
//!     → registry.rs (healthy subset under a read lock)
//!     → Return target or None
//!
//! Forwarding failure / health cycle
//!     → registry.rs (remove_target / replace_healthy under the write lock)
//! ```
//!
//! # Design Decisions
//! - Selection is a pure function of (cursor, healthy snapshot)
//! - The registry is the only shared mutable state
//! - Unhealthy targets are absent from the healthy subset, not flagged

pub mod registry;
pub mod round_robin;
pub mod target;

pub use registry::TargetRegistry;
pub use round_robin::RoundRobin;
pub use target::{Target, TargetError};

/// Strategy that picks the next target for a request.
pub trait LoadBalancer: Send + Sync {
    /// Next target, or `None` when no target is currently healthy.
    fn next_target(&self) -> Option<Target>;
}
