//! Beacon registry snapshot stored as TOML
//!
//! ```toml
//! [[beacon]]
//! uuid = "e2c56db5-dffb-48d2-b060-d0f5a71096e0"
//! major = 1
//! minor = "0x0002"
//! name = "Desk"
//! ```
//!
//! Major and minor may be written as strings or integers.

use crate::domain::types::BeaconDefinition;
use crate::services::region_monitor::MonitorHandle;
use crate::services::registry::SnapshotStore;
use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Default)]
struct BeaconFile {
    #[serde(default)]
    beacon: Vec<RawBeacon>,
}

#[derive(Debug, Deserialize)]
struct RawBeacon {
    #[serde(deserialize_with = "deserialize_component")]
    uuid: String,
    #[serde(deserialize_with = "deserialize_component")]
    major: String,
    #[serde(deserialize_with = "deserialize_component")]
    minor: String,
    #[serde(default, alias = "informal_name")]
    name: Option<String>,
}

impl From<RawBeacon> for BeaconDefinition {
    fn from(raw: RawBeacon) -> Self {
        BeaconDefinition { uuid: raw.uuid, major: raw.major, minor: raw.minor, informal_name: raw.name }
    }
}

fn deserialize_component<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct ComponentVisitor;

    impl<'de> Visitor<'de> for ComponentVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            // Negative values are kept so the registry reports them
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(ComponentVisitor)
}

/// Parse a beacon snapshot from TOML text
pub fn parse_beacons(content: &str) -> anyhow::Result<Vec<BeaconDefinition>> {
    let file: BeaconFile = toml::from_str(content).context("Failed to parse beacon list")?;
    Ok(file.beacon.into_iter().map(BeaconDefinition::from).collect())
}

/// Load the beacon snapshot from a file
///
/// A missing file is an empty registry.
pub fn load_beacons<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<BeaconDefinition>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read beacon file {}", path.display()))?;
    parse_beacons(&content).with_context(|| format!("Invalid beacon file {}", path.display()))
}

/// Reload the snapshot into the store and rebuild the watched regions
///
/// On a read or parse failure the current store and regions are left alone.
/// Returns the number of regions now watched.
pub fn reload_registry<P: AsRef<Path>>(
    path: P,
    store: &SnapshotStore,
    monitor: &MonitorHandle,
) -> anyhow::Result<usize> {
    let definitions = load_beacons(path.as_ref())?;
    store.replace(&definitions);
    let errors = monitor.rebuild(&definitions);
    info!(
        file = %path.as_ref().display(),
        beacons = %definitions.len(),
        rejected = %errors.len(),
        "beacon_registry_loaded"
    );
    Ok(monitor.region_count())
}
