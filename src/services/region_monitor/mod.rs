//! Region state tracking and presence event delivery
//!
//! The RegionMonitor owns one state per watched region and the in-range set.
//! All mutation goes through a single lock held by [`MonitorHandle`]:
//! - scanning-engine callbacks apply events under the lock
//! - registry rebuilds swap the region set under the same lock
//! - delivered events are queued for the broadcaster before the lock is
//!   released, so the queue order matches the mutation order

mod transitions;
#[cfg(test)]
mod tests;

pub use transitions::next_state;

use crate::domain::types::{
    BeaconDefinition, CanonicalEvent, DeliveredEvent, RegionId, RegionState,
};
use crate::infra::metrics::Metrics;
use crate::services::in_range::InRangeSet;
use crate::services::registry::{Region, RegionRegistry, RegistryError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-region state
#[derive(Debug, Clone)]
pub(crate) struct RegionEntry {
    pub(crate) region: Region,
    pub(crate) state: RegionState,
    /// Timestamp of the last delivered transition
    pub(crate) last_change: Option<u64>,
}

impl RegionEntry {
    fn new(region: Region) -> Self {
        Self { region, state: RegionState::Outside, last_change: None }
    }
}

/// Authoritative presence state for the installed region set
pub struct RegionMonitor {
    pub(crate) regions: FxHashMap<RegionId, RegionEntry>,
    pub(crate) in_range: InRangeSet,
    /// Incremented on every rebuild
    generation: u64,
    pub(crate) metrics: Arc<Metrics>,
}

impl RegionMonitor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { regions: FxHashMap::default(), in_range: InRangeSet::new(), generation: 0, metrics }
    }

    /// Discard the old region set and install a new one
    ///
    /// All states restart at Outside and the in-range set is emptied.
    pub fn install(&mut self, regions: Vec<Region>) -> u64 {
        self.regions.clear();
        self.in_range.clear();
        self.generation += 1;
        for region in regions {
            self.regions.insert(region.id.clone(), RegionEntry::new(region));
        }
        self.generation
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.regions.contains_key(id)
    }

    pub fn state(&self, id: &RegionId) -> Option<RegionState> {
        self.regions.get(id).map(|entry| entry.state)
    }

    /// Timestamp of the last delivered transition for a region
    pub fn last_change(&self, id: &RegionId) -> Option<u64> {
        self.regions.get(id).and_then(|entry| entry.last_change)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_range(&self) -> &InRangeSet {
        &self.in_range
    }
}

/// Message for the broadcaster task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A deduplicated presence change
    Delivered(DeliveredEvent),
    /// The region set was replaced; observers get the emptied snapshot
    Rebuilt { generation: u64, in_range: Vec<BeaconDefinition> },
}

pub type DispatchReceiver = mpsc::UnboundedReceiver<Dispatch>;

/// Shared, lock-guarded access to the region monitor
///
/// Cheap to clone. Every method returns without waiting on I/O.
#[derive(Clone)]
pub struct MonitorHandle {
    monitor: Arc<Mutex<RegionMonitor>>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    metrics: Arc<Metrics>,
}

/// Create a monitor and the queue the broadcaster consumes
pub fn create_monitor(metrics: Arc<Metrics>) -> (MonitorHandle, DispatchReceiver) {
    let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
    let monitor = Arc::new(Mutex::new(RegionMonitor::new(metrics.clone())));
    (MonitorHandle { monitor, dispatch_tx, metrics }, dispatch_rx)
}

impl MonitorHandle {
    /// Rebuild the region set from a full registry snapshot
    ///
    /// Returns the definitions that could not be monitored. Events for regions
    /// that are not part of the new set are dropped from here on.
    pub fn rebuild(&self, definitions: &[BeaconDefinition]) -> Vec<RegistryError> {
        let build = RegionRegistry::build(definitions);
        for error in &build.errors {
            warn!(error = %error, reason = %error.reason, "registry_error");
        }
        let region_count = build.regions.len();

        let mut monitor = self.monitor.lock();
        let generation = monitor.install(build.regions);
        self.metrics.record_rebuild(region_count, build.errors.len());
        let in_range = monitor.in_range.snapshot();
        if self.dispatch_tx.send(Dispatch::Rebuilt { generation, in_range }).is_err() {
            debug!("dispatch_closed");
        }
        drop(monitor);

        info!(
            generation = %generation,
            regions = %region_count,
            errors = %build.errors.len(),
            "regions_rebuilt"
        );
        build.errors
    }

    /// Apply a canonical event and queue the resulting delivery, if any
    pub fn submit(&self, event: CanonicalEvent) -> Option<DeliveredEvent> {
        let mut monitor = self.monitor.lock();
        let started = Instant::now();
        let delivered = monitor.apply(&event);
        if let Some(ref delivered) = delivered {
            if self.dispatch_tx.send(Dispatch::Delivered(delivered.clone())).is_err() {
                debug!(region_id = %delivered.region_id, "dispatch_closed");
            }
        }
        drop(monitor);
        self.metrics.record_apply_latency(started.elapsed().as_micros() as u64);
        delivered
    }

    pub fn state(&self, id: &RegionId) -> Option<RegionState> {
        self.monitor.lock().state(id)
    }

    /// Copy of the in-range set
    pub fn in_range(&self) -> Vec<BeaconDefinition> {
        self.monitor.lock().in_range.snapshot()
    }

    pub fn region_count(&self) -> usize {
        self.monitor.lock().region_count()
    }

    pub fn generation(&self) -> u64 {
        self.monitor.lock().generation()
    }
}
