//! Boundary between the scanning engine and the region monitor
//!
//! Translates raw callbacks into canonical events and hands them to the
//! monitor. Never blocks the caller's thread: the monitor lock is only held
//! for the in-memory transition and delivery is queued.

use crate::domain::types::{CanonicalEvent, EventKind, RawRegionState, RegionId};
use crate::infra::metrics::Metrics;
use crate::services::region_monitor::MonitorHandle;
use std::sync::Arc;
use tracing::info;

/// Receives region callbacks from the scanning engine
#[derive(Clone)]
pub struct ProximityAdapter {
    monitor: MonitorHandle,
    metrics: Arc<Metrics>,
}

impl ProximityAdapter {
    pub fn new(monitor: MonitorHandle, metrics: Arc<Metrics>) -> Self {
        Self { monitor, metrics }
    }

    pub fn on_enter(&self, raw_region_id: &str) {
        self.forward(CanonicalEvent::new(RegionId::from(raw_region_id), EventKind::Enter));
    }

    pub fn on_exit(&self, raw_region_id: &str) {
        self.forward(CanonicalEvent::new(RegionId::from(raw_region_id), EventKind::Exit));
    }

    /// Informational state report; never changes presence
    pub fn on_state_determined(&self, raw_region_id: &str, raw_state: i32) {
        let state = RawRegionState::from(raw_state);
        info!(region_id = %raw_region_id, state = %state.as_str(), code = %raw_state, "region_state_determined");
        self.metrics.record_state_determined();
        self.forward(CanonicalEvent::new(
            RegionId::from(raw_region_id),
            EventKind::StateUnchanged(state),
        ));
    }

    /// Unknown region ids are dropped by the monitor under its lock, so a
    /// rebuild can never race with the check.
    fn forward(&self, event: CanonicalEvent) {
        self.metrics.record_callback();
        self.monitor.submit(event);
    }
}
