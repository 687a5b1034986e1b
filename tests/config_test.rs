//! Integration tests for configuration loading

use beacon_mqtt::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[mqtt]
host = "broker.local"
port = 1884
client_id = "pi-hall"
username = "scanner"
password = "secret"
keep_alive_secs = 30

[topics]
namespace = "office/beacons"
scanner = "scanner/hall"

[notifications]
on_enter = true
on_exit = false

[beacons]
file = "/etc/beacon-mqtt/beacons.toml"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_client_id(), "pi-hall");
    assert_eq!(config.mqtt_username(), Some("scanner"));
    assert_eq!(config.mqtt_password(), Some("secret"));
    assert_eq!(config.mqtt_keep_alive_secs(), 30);
    assert_eq!(config.topic_namespace(), "office/beacons");
    assert_eq!(config.scanner_topic(), "scanner/hall");
    assert_eq!(config.beacons_file(), "/etc/beacon-mqtt/beacons.toml");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);

    let notifications = config.notification_config();
    assert!(notifications.notify_on_enter);
    assert!(!notifications.notify_on_exit);
}

#[test]
fn test_partial_config_uses_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[notifications]\non_exit = true\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.topic_namespace(), "beacon");
    assert_eq!(config.scanner_topic(), "beacon-scanner/callbacks");
    assert!(!config.notification_config().notify_on_enter);
    assert!(config.notification_config().notify_on_exit);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/path/config.toml");

    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_invalid_toml_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[mqtt\nhost = 1").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}
