//! Transition table for region presence
//!
//! | state   | event | next    | delivered |
//! |---------|-------|---------|-----------|
//! | Outside | Enter | Inside  | Enter     |
//! | Inside  | Enter | Inside  | -         |
//! | Inside  | Exit  | Outside | Exit      |
//! | Outside | Exit  | Outside | -         |
//! | any     | State | same    | -         |

use super::RegionMonitor;
use crate::domain::types::{CanonicalEvent, DeliveredEvent, EventKind, RegionState, Transition};
use tracing::{debug, info};

/// Next state and the transition to deliver, if any
pub fn next_state(state: RegionState, kind: EventKind) -> (RegionState, Option<Transition>) {
    match (state, kind) {
        (RegionState::Outside, EventKind::Enter) => (RegionState::Inside, Some(Transition::Enter)),
        (RegionState::Inside, EventKind::Exit) => (RegionState::Outside, Some(Transition::Exit)),
        (state, _) => (state, None),
    }
}

impl RegionMonitor {
    /// Apply one event to its region
    ///
    /// The in-range set is updated in the same call that produces the
    /// delivered event. Events for regions outside the installed set are
    /// dropped.
    pub fn apply(&mut self, event: &CanonicalEvent) -> Option<DeliveredEvent> {
        let Some(entry) = self.regions.get_mut(&event.region_id) else {
            debug!(region_id = %event.region_id, kind = %event.kind.as_str(), "unknown_region_callback");
            self.metrics.record_unknown_region();
            return None;
        };

        let (next, transition) = next_state(entry.state, event.kind);

        let Some(transition) = transition else {
            match event.kind {
                EventKind::StateUnchanged(_) => {}
                _ => {
                    debug!(
                        region_id = %event.region_id,
                        kind = %event.kind.as_str(),
                        state = %entry.state.as_str(),
                        "duplicate_callback_suppressed"
                    );
                    self.metrics.record_duplicate_suppressed();
                }
            }
            return None;
        };

        entry.state = next;
        entry.last_change = Some(event.timestamp);
        let beacon = entry.region.definition.clone();

        match transition {
            Transition::Enter => {
                self.in_range.insert(event.region_id.clone(), beacon.clone());
                self.metrics.record_enter();
            }
            Transition::Exit => {
                self.in_range.remove(&event.region_id);
                self.metrics.record_exit();
            }
        }
        self.metrics.set_beacons_in_range(self.in_range.len());

        info!(
            region_id = %event.region_id,
            transition = %transition.as_str(),
            in_range = %self.in_range.len(),
            "region_transition"
        );

        Some(DeliveredEvent {
            region_id: event.region_id.clone(),
            beacon,
            transition,
            timestamp: event.timestamp,
            in_range: self.in_range.snapshot(),
        })
    }
}
