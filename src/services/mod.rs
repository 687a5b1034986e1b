//! Services - region monitoring and event broadcast
//!
//! - `registry` - Builds watched regions from the beacon registry snapshot
//! - `adapter` - Translates scanning-engine callbacks into canonical events
//! - `region_monitor` - Per-region state machine and the mutation lock
//! - `in_range` - Beacons currently considered present
//! - `broadcaster` - Publishes presence changes, raises alerts, feeds observers
//! - `notification_policy` - Decides whether a change raises a local alert

pub mod adapter;
pub mod broadcaster;
pub mod in_range;
pub mod notification_policy;
pub mod region_monitor;
pub mod registry;

pub use adapter::ProximityAdapter;
pub use broadcaster::{EventBroadcaster, InRangeObserver, Notifier, Transport, TransportError};
pub use notification_policy::{NotificationConfig, NotificationPolicy};
pub use region_monitor::{create_monitor, Dispatch, MonitorHandle};
pub use registry::{BeaconStore, RegionRegistry, RegistryError, SnapshotStore};
