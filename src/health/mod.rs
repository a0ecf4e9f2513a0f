//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → Probe every configured target (probe.rs)
//!     → Build a fresh healthy list in configured order
//!     → TargetRegistry::replace_healthy
//! ```
//!
//! # Design Decisions
//! - No state carries over between cycles; each cycle is authoritative
//! - A failed probe only excludes the target for that cycle
//! - The loop stops on the shutdown broadcast

pub mod monitor;
pub mod probe;

pub use monitor::HealthMonitor;
pub use probe::{HttpProbe, Probe};
