//! IO modules - external system interfaces
//!
//! - `scanner_feed` - MQTT subscriber for scanning-engine region callbacks
//! - `mqtt_transport` - MQTT publisher for presence messages
//! - `beacon_file` - Beacon registry snapshot loaded from TOML
//! - `notifier` - Log-backed alerts and in-range observer
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod beacon_file;
pub mod mqtt_transport;
pub mod notifier;
pub mod prometheus;
pub mod scanner_feed;

pub use beacon_file::{load_beacons, reload_registry};
pub use mqtt_transport::MqttTransport;
pub use notifier::{LogNotifier, LogObserver};
pub use scanner_feed::{start_scanner_feed, ScannerCallback};
