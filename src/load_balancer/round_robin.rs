//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::load_balancer::{registry::TargetRegistry, target::Target, LoadBalancer};

/// Pick `healthy[cursor mod len]`, or `None` when nothing is healthy.
pub fn select(cursor: u64, healthy: &[Target]) -> Option<&Target> {
    if healthy.is_empty() {
        return None;
    }
    let index = cursor % healthy.len() as u64;
    healthy.get(index as usize)
}

/// Round-robin selector over a [`TargetRegistry`].
///
/// The request cursor advances exactly once per selection attempt. Its value
/// is mapped onto whatever the healthy subset looks like at that instant, so
/// rotation adapts to membership changes straight away but is only
/// approximately even across them.
#[derive(Debug)]
pub struct RoundRobin {
    registry: Arc<TargetRegistry>,
    cursor: AtomicU64,
}

impl RoundRobin {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            cursor: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }
}

impl LoadBalancer for RoundRobin {
    fn next_target(&self) -> Option<Target> {
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.registry
            .with_healthy(|healthy| select(cursor, healthy).cloned())
    }
}
