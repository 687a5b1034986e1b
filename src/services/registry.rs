//! Region registry - builds watched regions from a beacon registry snapshot
//!
//! Malformed definitions are reported and skipped; they never prevent the
//! remaining regions from being built.

use crate::domain::identifier::{Identifier, IdentifierError};
use crate::domain::types::{BeaconDefinition, RegionId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// A watched region built from a valid beacon definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub uuid: Identifier,
    pub major: Identifier,
    pub minor: Identifier,
    pub definition: BeaconDefinition,
}

/// Why a definition could not become a region
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryErrorReason {
    #[error("invalid uuid: {0}")]
    Uuid(IdentifierError),
    #[error("invalid major: {0}")]
    Major(IdentifierError),
    #[error("invalid minor: {0}")]
    Minor(IdentifierError),
    #[error("region id {0} collides with another beacon")]
    IdCollision(RegionId),
}

/// A malformed beacon definition
///
/// `Display` gives the user-facing warning text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryError {
    pub definition: BeaconDefinition,
    pub reason: RegistryErrorReason,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Not able to start monitoring for beacon with ")?;
        if let Some(name) = self.definition.display_name() {
            write!(f, "name: \"{}\" with ", name)?;
        }
        write!(
            f,
            "uuid: \"{}\" major: \"{}\" minor: \"{}\"",
            self.definition.uuid, self.definition.major, self.definition.minor
        )
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

/// Result of building regions from a snapshot
#[derive(Debug, Default)]
pub struct RegistryBuild {
    pub regions: Vec<Region>,
    pub errors: Vec<RegistryError>,
}

pub struct RegionRegistry;

impl RegionRegistry {
    /// Build regions in snapshot order, collecting errors for invalid definitions
    pub fn build(definitions: &[BeaconDefinition]) -> RegistryBuild {
        let mut build = RegistryBuild::default();
        let mut seen_ids: HashSet<RegionId> = HashSet::new();
        let mut seen_keys: HashSet<(&str, &str, &str)> = HashSet::new();

        for definition in definitions {
            let key = (definition.uuid.as_str(), definition.major.as_str(), definition.minor.as_str());
            if !seen_keys.insert(key) {
                debug!(uuid = %definition.uuid, major = %definition.major, minor = %definition.minor, "duplicate_beacon_skipped");
                continue;
            }

            match Self::region_for(definition) {
                Ok(region) => {
                    if !seen_ids.insert(region.id.clone()) {
                        build.errors.push(RegistryError {
                            definition: definition.clone(),
                            reason: RegistryErrorReason::IdCollision(region.id),
                        });
                        continue;
                    }
                    build.regions.push(region);
                }
                Err(reason) => {
                    build.errors.push(RegistryError { definition: definition.clone(), reason });
                }
            }
        }

        build
    }

    fn region_for(definition: &BeaconDefinition) -> Result<Region, RegistryErrorReason> {
        let uuid = Identifier::parse_uuid(&definition.uuid).map_err(RegistryErrorReason::Uuid)?;
        let major = Identifier::parse_u16(&definition.major).map_err(RegistryErrorReason::Major)?;
        let minor = Identifier::parse_u16(&definition.minor).map_err(RegistryErrorReason::Minor)?;
        Ok(Region { id: definition.region_id(), uuid, major, minor, definition: definition.clone() })
    }
}

/// Read access to the external beacon registry
///
/// Used to resolve delivered events; the registry may have changed since the
/// regions were built.
pub trait BeaconStore: Send + Sync {
    fn get_beacon(&self, uuid: &str, major: &str, minor: &str) -> Option<BeaconDefinition>;
}

/// In-memory registry snapshot that is replaced wholesale on reload
#[derive(Default)]
pub struct SnapshotStore {
    beacons: RwLock<FxHashMap<(String, String, String), BeaconDefinition>>,
}

impl SnapshotStore {
    pub fn new(definitions: &[BeaconDefinition]) -> Self {
        let store = Self::default();
        store.replace(definitions);
        store
    }

    /// Replace the whole snapshot; the first of any duplicate triples wins
    pub fn replace(&self, definitions: &[BeaconDefinition]) {
        let mut beacons = FxHashMap::default();
        for def in definitions {
            beacons
                .entry((def.uuid.clone(), def.major.clone(), def.minor.clone()))
                .or_insert_with(|| def.clone());
        }
        *self.beacons.write() = beacons;
    }

    pub fn len(&self) -> usize {
        self.beacons.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.read().is_empty()
    }
}

impl BeaconStore for SnapshotStore {
    fn get_beacon(&self, uuid: &str, major: &str, minor: &str) -> Option<BeaconDefinition> {
        self.beacons
            .read()
            .get(&(uuid.to_string(), major.to_string(), minor.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "e2c56db5-dffb-48d2-b060-d0f5a71096e0";

    #[test]
    fn test_build_skips_malformed() {
        let definitions = vec![
            BeaconDefinition::new(UUID, "1", "1"),
            BeaconDefinition::new("not a uuid", "1", "2").with_name("Broken"),
            BeaconDefinition::new(UUID, "1", "3"),
        ];

        let build = RegionRegistry::build(&definitions);

        assert_eq!(build.regions.len(), 2);
        assert_eq!(build.errors.len(), 1);
        assert_eq!(build.regions[0].definition.minor, "1");
        assert_eq!(build.regions[1].definition.minor, "3");
        assert!(matches!(build.errors[0].reason, RegistryErrorReason::Uuid(_)));
    }

    #[test]
    fn test_registry_error_message() {
        let definitions = vec![BeaconDefinition::new(UUID, "70000", "1").with_name("Desk")];
        let build = RegionRegistry::build(&definitions);
        assert!(build.regions.is_empty());
        assert_eq!(
            build.errors[0].to_string(),
            format!(
                "Not able to start monitoring for beacon with name: \"Desk\" with uuid: \"{}\" major: \"70000\" minor: \"1\"",
                UUID
            )
        );

        let definitions = vec![BeaconDefinition::new(UUID, "1", "x")];
        let build = RegionRegistry::build(&definitions);
        assert_eq!(
            build.errors[0].to_string(),
            format!("Not able to start monitoring for beacon with uuid: \"{}\" major: \"1\" minor: \"x\"", UUID)
        );
        assert!(matches!(build.errors[0].reason, RegistryErrorReason::Minor(_)));
    }

    #[test]
    fn test_long_decimal_uuid_is_rejected() {
        let build = RegionRegistry::build(&[BeaconDefinition::new("123456", "1", "1")]);
        assert!(build.regions.is_empty());
        assert_eq!(build.errors.len(), 1);
        assert!(matches!(
            build.errors[0].reason,
            RegistryErrorReason::Uuid(IdentifierError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_duplicates_are_normalized() {
        let definitions = vec![
            BeaconDefinition::new("A", "1", "1").with_name("First"),
            BeaconDefinition::new("A", "1", "1").with_name("Second"),
        ];
        let build = RegionRegistry::build(&definitions);
        assert_eq!(build.regions.len(), 1);
        assert!(build.errors.is_empty());
        assert_eq!(build.regions[0].definition.informal_name.as_deref(), Some("First"));
    }

    #[test]
    fn test_colliding_region_ids_are_reported() {
        let definitions =
            vec![BeaconDefinition::new("A", "12", "3"), BeaconDefinition::new("A", "1", "23")];
        let build = RegionRegistry::build(&definitions);
        assert_eq!(build.regions.len(), 1);
        assert_eq!(build.errors.len(), 1);
        assert!(matches!(build.errors[0].reason, RegistryErrorReason::IdCollision(_)));
    }

    #[test]
    fn test_snapshot_store_lookup_and_replace() {
        let store = SnapshotStore::new(&[BeaconDefinition::new("A", "1", "1").with_name("Desk")]);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get_beacon("A", "1", "1").and_then(|b| b.informal_name),
            Some("Desk".to_string())
        );

        store.replace(&[]);
        assert!(store.is_empty());
        assert!(store.get_beacon("A", "1", "1").is_none());
    }
}
