//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every configured target
//! - Rebuild the healthy subset from scratch and install it atomically
//!
//! The monitor is the only recovery path: a target demoted by the
//! forwarding path comes back at the first cycle whose probe succeeds.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::health::probe::Probe;
use crate::load_balancer::{Target, TargetRegistry};
use crate::observability::metrics;

pub struct HealthMonitor {
    registry: Arc<TargetRegistry>,
    probe: Arc<dyn Probe>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<TargetRegistry>, probe: Arc<dyn Probe>, interval: Duration) -> Self {
        Self {
            registry,
            probe,
            interval,
        }
    }

    /// Run cycles until the shutdown signal fires. The first cycle starts immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            targets = self.registry.all_targets().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every configured target once and install the result.
    ///
    /// Returns the healthy list that was installed.
    pub async fn run_cycle(&self) -> Vec<Target> {
        let all_targets = self.registry.all_targets();
        tracing::debug!(targets = all_targets.len(), "Running health checks");

        let results = join_all(all_targets.iter().map(|target| self.probe.probe(target))).await;

        let healthy: Vec<Target> = all_targets
            .iter()
            .zip(results)
            .filter_map(|(target, up)| {
                metrics::record_probe(target.address(), up);
                up.then(|| target.clone())
            })
            .collect();

        self.registry.replace_healthy(healthy.clone());
        metrics::record_healthy_targets(healthy.len());

        tracing::info!(
            healthy = healthy.len(),
            total = all_targets.len(),
            "Health check cycle complete"
        );
        healthy
    }
}
