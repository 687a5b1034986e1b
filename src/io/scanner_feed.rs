//! MQTT ingress for scanning-engine callbacks
//!
//! The scanning engine publishes one JSON message per region callback:
//! - `{"callback":"enter","region":"<id>"}`
//! - `{"callback":"exit","region":"<id>"}`
//! - `{"callback":"state","region":"<id>","state":1}`
//!
//! Each message is handed straight to the ProximityAdapter from the MQTT
//! event loop. Malformed messages are logged and skipped.

use crate::infra::config::Config;
use crate::services::adapter::ProximityAdapter;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One raw callback from the scanning engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "callback", rename_all = "lowercase")]
pub enum ScannerCallback {
    Enter { region: String },
    Exit { region: String },
    State { region: String, state: i32 },
}

impl ScannerCallback {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Invoke the matching adapter callback
    pub fn deliver(&self, adapter: &ProximityAdapter) {
        match self {
            ScannerCallback::Enter { region } => adapter.on_enter(region),
            ScannerCallback::Exit { region } => adapter.on_exit(region),
            ScannerCallback::State { region, state } => adapter.on_state_determined(region, *state),
        }
    }
}

/// Subscribe to the scanner topic and feed callbacks to the adapter
pub async fn start_scanner_feed(
    config: &Config,
    adapter: ProximityAdapter,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client_id = format!("{}-feed-{}", config.mqtt_client_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs()));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let topic = config.scanner_topic().to_string();
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    info!(topic = %topic, host = %config.mqtt_host(), port = %config.mqtt_port(), "scanner_feed_starting");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("scanner_feed_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscriptions do not survive a clean-session reconnect
                        match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            Ok(()) => info!(topic = %topic, "scanner_feed_subscribed"),
                            Err(e) => warn!(topic = %topic, error = %e, "scanner_feed_subscribe_failed"),
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match ScannerCallback::parse(&publish.payload) {
                            Ok(callback) => {
                                debug!(callback = ?callback, "scanner_callback");
                                callback.deliver(&adapter);
                            }
                            Err(e) => {
                                warn!(topic = %publish.topic, error = %e, "scanner_callback_malformed");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "scanner_feed_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BeaconDefinition, RegionId, RegionState};
    use crate::infra::metrics::Metrics;
    use crate::services::region_monitor::create_monitor;
    use std::sync::Arc;

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(
            ScannerCallback::parse(br#"{"callback":"enter","region":"A11"}"#).unwrap(),
            ScannerCallback::Enter { region: "A11".to_string() }
        );
        assert_eq!(
            ScannerCallback::parse(br#"{"callback":"state","region":"A11","state":0}"#).unwrap(),
            ScannerCallback::State { region: "A11".to_string(), state: 0 }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ScannerCallback::parse(br#"{"callback":"wave","region":"A11"}"#).is_err());
        assert!(ScannerCallback::parse(br#"{"callback":"enter"}"#).is_err());
        assert!(ScannerCallback::parse(b"not json").is_err());
    }

    #[test]
    fn test_deliver_reaches_monitor() {
        let metrics = Arc::new(Metrics::new());
        let (handle, _rx) = create_monitor(metrics.clone());
        handle.rebuild(&[BeaconDefinition::new("A", "1", "1")]);
        let adapter = ProximityAdapter::new(handle.clone(), metrics);

        ScannerCallback::Enter { region: "A11".to_string() }.deliver(&adapter);

        assert_eq!(handle.state(&RegionId::from("A11")), Some(RegionState::Inside));
    }
}
