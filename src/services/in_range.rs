//! Set of beacons currently considered in range
//!
//! Only the region monitor mutates it. Everyone else gets a copy.

use crate::domain::types::{BeaconDefinition, RegionId};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct InRangeSet {
    entries: FxHashMap<RegionId, BeaconDefinition>,
}

impl InRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: RegionId, beacon: BeaconDefinition) {
        self.entries.insert(id, beacon);
    }

    pub(crate) fn remove(&mut self, id: &RegionId) -> Option<BeaconDefinition> {
        self.entries.remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current contents, ordered by region id
    pub fn snapshot(&self) -> Vec<BeaconDefinition> {
        let mut ids: Vec<&RegionId> = self.entries.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.entries.get(id).cloned()).collect()
    }
}
