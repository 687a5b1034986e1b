//! Log-backed notifier and in-range observer for headless deployments

use crate::domain::types::BeaconDefinition;
use crate::services::broadcaster::{InRangeObserver, Notifier};
use tracing::info;

/// Emits alerts as log lines
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title = %title, message = %message, "notification");
    }
}

/// Logs the in-range set whenever it changes
pub struct LogObserver;

impl InRangeObserver for LogObserver {
    fn on_in_range_changed(&self, snapshot: &[BeaconDefinition]) {
        let beacons: Vec<String> = snapshot.iter().map(label).collect();
        info!(count = %snapshot.len(), beacons = ?beacons, "in_range_changed");
    }
}

/// Informal name, or the identifier triple when unnamed
fn label(beacon: &BeaconDefinition) -> String {
    match beacon.display_name() {
        Some(name) => name.to_string(),
        None => format!("{}/{}/{}", beacon.uuid, beacon.major, beacon.minor),
    }
}
