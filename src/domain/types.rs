//! Shared types for beacon region monitoring

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch time in milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A user-registered beacon as stored in the external registry
///
/// Identity is the `(uuid, major, minor)` triple. The components are kept as
/// the strings the user typed; they are validated when regions are built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconDefinition {
    pub uuid: String,
    pub major: String,
    pub minor: String,
    #[serde(default, rename = "name", alias = "informal_name", skip_serializing_if = "Option::is_none")]
    pub informal_name: Option<String>,
}

impl BeaconDefinition {
    pub fn new(uuid: &str, major: &str, minor: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            major: major.to_string(),
            minor: minor.to_string(),
            informal_name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.informal_name = Some(name.to_string());
        self
    }

    /// Region id derived from the identifier triple
    pub fn region_id(&self) -> RegionId {
        RegionId(format!("{}{}{}", self.uuid, self.major, self.minor))
    }

    /// Whether this definition has the given identifier triple
    pub fn matches(&self, uuid: &str, major: &str, minor: &str) -> bool {
        self.uuid == uuid && self.major == major && self.minor == minor
    }

    /// Informal name, ignoring empty strings
    pub fn display_name(&self) -> Option<&str> {
        self.informal_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Newtype wrapper for region ids
///
/// Raw callbacks from the scanning engine carry this id back to us.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionId {
    fn from(raw: &str) -> Self {
        RegionId(raw.to_string())
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence state of a single watched region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionState {
    #[default]
    Outside,
    Inside,
}

impl RegionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionState::Outside => "outside",
            RegionState::Inside => "inside",
        }
    }
}

/// Region state as reported by the scanning engine's state callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRegionState {
    Outside,
    Inside,
    Unknown(i32),
}

impl From<i32> for RawRegionState {
    fn from(code: i32) -> Self {
        match code {
            0 => RawRegionState::Outside,
            1 => RawRegionState::Inside,
            other => RawRegionState::Unknown(other),
        }
    }
}

impl RawRegionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawRegionState::Outside => "outside",
            RawRegionState::Inside => "inside",
            RawRegionState::Unknown(_) => "unknown",
        }
    }
}

/// Kind of a canonical event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enter,
    Exit,
    /// Informational state report, never changes presence
    StateUnchanged(RawRegionState),
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
            EventKind::StateUnchanged(_) => "state_unchanged",
        }
    }
}

/// Normalized callback from the scanning engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub region_id: RegionId,
    pub kind: EventKind,
    pub timestamp: u64,
}

impl CanonicalEvent {
    pub fn new(region_id: RegionId, kind: EventKind) -> Self {
        Self { region_id, kind, timestamp: epoch_ms() }
    }
}

/// A presence change that survived deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Enter,
    Exit,
}

impl Transition {
    /// Action string used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Enter => "enter",
            Transition::Exit => "exit",
        }
    }
}

/// Presence change emitted by the region state machine
///
/// Carries the in-range snapshot taken in the same critical section as the
/// mutation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredEvent {
    pub region_id: RegionId,
    /// Definition the region was built from
    pub beacon: BeaconDefinition,
    pub transition: Transition,
    pub timestamp: u64,
    pub in_range: Vec<BeaconDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_id_is_concatenation() {
        let def = BeaconDefinition::new("e2c56db5-dffb-48d2-b060-d0f5a71096e0", "1", "42");
        assert_eq!(def.region_id().as_str(), "e2c56db5-dffb-48d2-b060-d0f5a71096e0142");
    }

    #[test]
    fn test_display_name_ignores_empty() {
        let def = BeaconDefinition::new("A", "1", "1").with_name("");
        assert_eq!(def.display_name(), None);
        let def = BeaconDefinition::new("A", "1", "1").with_name("Desk");
        assert_eq!(def.display_name(), Some("Desk"));
    }

    #[test]
    fn test_raw_region_state_from_code() {
        assert_eq!(RawRegionState::from(0), RawRegionState::Outside);
        assert_eq!(RawRegionState::from(1), RawRegionState::Inside);
        assert_eq!(RawRegionState::from(7), RawRegionState::Unknown(7));
    }
}
