//! Synchronizer: probe every registered toggle and publish the result.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::models::{Availability, ToggleSnapshot};
use crate::registry::{read_registry, write_registry, SharedRegistry};
use crate::script::StateProber;

/// Default bound on concurrent `check` processes.
pub fn default_probe_concurrency() -> usize {
    (num_cpus::get() * 2).max(1)
}

/// Summary of one `sync_all` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Every toggle after the pass, in registration order.
    pub snapshots: Vec<ToggleSnapshot>,
    pub available: usize,
    pub locked: usize,
    pub unavailable: usize,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct Synchronizer {
    registry: SharedRegistry,
    prober: StateProber,
    limit: Arc<Semaphore>,
}

impl Synchronizer {
    pub fn new(registry: SharedRegistry, prober: StateProber) -> Self {
        Self::with_concurrency(registry, prober, default_probe_concurrency())
    }

    pub fn with_concurrency(registry: SharedRegistry, prober: StateProber, max_concurrent: usize) -> Self {
        Synchronizer {
            registry,
            prober,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Probe all toggles concurrently, then recompute visibility once every
    /// probe of this pass has landed.
    ///
    /// Each probe result is written under its own short write lock, so a
    /// reader sees a toggle either before or after its update, never half
    /// of it. The registry lock is never held while a script runs.
    pub async fn sync_all(&self) -> SyncReport {
        let started = Instant::now();
        let targets: Vec<_> = read_registry(&self.registry)
            .iter()
            .map(|t| (t.id, t.script_path.clone()))
            .collect();

        log::debug!("[Sync] Probing {} toggles", targets.len());

        let probes = targets.iter().map(|(id, path)| async move {
            let _permit = self.limit.acquire().await.ok();
            let outcome = self.prober.probe(path).await;
            let applied = write_registry(&self.registry).apply_probe(*id, &outcome);
            if let Err(e) = applied {
                // Registry replaced under us; nothing to update.
                log::error!("[Sync] {}", e);
            }
            outcome.availability
        });
        let availabilities = join_all(probes).await;

        let snapshots = {
            let mut registry = write_registry(&self.registry);
            registry.recompute_visibility();
            registry.snapshots()
        };

        let count = |wanted: Availability| availabilities.iter().filter(|a| **a == wanted).count();
        let report = SyncReport {
            snapshots,
            available: count(Availability::Available),
            locked: count(Availability::LockedOn),
            unavailable: count(Availability::Unavailable),
            elapsed: started.elapsed(),
        };

        log::info!(
            "[Sync] Synchronized {} toggles in {}ms ({} available, {} locked, {} unavailable)",
            report.snapshots.len(),
            report.elapsed.as_millis(),
            report.available,
            report.locked,
            report.unavailable
        );
        report
    }
}
