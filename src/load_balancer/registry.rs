//! Target registry.
//!
//! # Responsibilities
//! - Hold the configured target list (fixed for the process lifetime)
//! - Hold the healthy subset behind a reader/writer lock
//! - Keep the healthy subset duplicate-free and in configured order
//!
//! The configured list is immutable after construction and read without
//! locking. Every healthy-subset read or write takes the lock only for the
//! duration of that single operation; it is never held across an `.await`.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::load_balancer::target::Target;

/// Shared balancer state: configured targets and the currently healthy ones.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: Vec<Target>,
    healthy: RwLock<Vec<Target>>,
}

impl TargetRegistry {
    /// Create a registry where every configured target starts healthy.
    ///
    /// Duplicate addresses are collapsed, keeping the first occurrence.
    pub fn new(targets: Vec<Target>) -> Self {
        let mut unique: Vec<Target> = Vec::with_capacity(targets.len());
        for target in targets {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }

        Self {
            healthy: RwLock::new(unique.clone()),
            targets: unique,
        }
    }

    /// The full configured list.
    pub fn all_targets(&self) -> &[Target] {
        &self.targets
    }

    /// Copy of the healthy subset at this instant.
    pub fn healthy_snapshot(&self) -> Vec<Target> {
        self.read().clone()
    }

    /// Number of healthy targets.
    pub fn healthy_count(&self) -> usize {
        self.read().len()
    }

    pub fn is_healthy(&self, target: &Target) -> bool {
        self.read().contains(target)
    }

    /// Run `f` against the healthy subset while holding the read lock.
    pub(crate) fn with_healthy<R>(&self, f: impl FnOnce(&[Target]) -> R) -> R {
        f(&self.read())
    }

    /// Mark a target healthy again.
    ///
    /// The target is placed at its configured position so the healthy subset
    /// stays a subsequence of the configured list. Returns `false` when the
    /// target was already healthy or is not a configured target.
    pub fn add_target(&self, target: &Target) -> bool {
        let Some(rank) = self.rank(target) else {
            tracing::warn!(upstream = %target, "Ignoring add of unconfigured target");
            return false;
        };

        let mut healthy = self.write();
        if healthy.contains(target) {
            return false;
        }

        let position = healthy
            .iter()
            .position(|t| self.rank(t).is_some_and(|r| r > rank))
            .unwrap_or(healthy.len());
        healthy.insert(position, target.clone());

        tracing::info!(upstream = %target, healthy = healthy.len(), "Target added to healthy set");
        true
    }

    /// Remove a target from the healthy subset. Absent targets are a no-op.
    pub fn remove_target(&self, target: &Target) -> bool {
        let mut healthy = self.write();
        match healthy.iter().position(|t| t == target) {
            Some(index) => {
                healthy.remove(index);
                tracing::warn!(upstream = %target, healthy = healthy.len(), "Target removed from healthy set");
                true
            }
            None => false,
        }
    }

    /// Atomically install a new healthy subset.
    ///
    /// The incoming set is reordered to configured order; duplicates and
    /// unconfigured targets are dropped.
    pub fn replace_healthy(&self, new_set: Vec<Target>) {
        let normalised: Vec<Target> = self
            .targets
            .iter()
            .filter(|t| new_set.contains(t))
            .cloned()
            .collect();

        if normalised.len() != new_set.len() {
            tracing::debug!(
                requested = new_set.len(),
                installed = normalised.len(),
                "Dropped duplicate or unconfigured targets from healthy set"
            );
        }

        *self.write() = normalised;
    }

    fn rank(&self, target: &Target) -> Option<usize> {
        self.targets.iter().position(|t| t == target)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Target>> {
        self.healthy.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Target>> {
        self.healthy.write().unwrap_or_else(PoisonError::into_inner)
    }
}
