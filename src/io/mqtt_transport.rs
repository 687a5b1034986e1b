//! MQTT transport for presence messages
//!
//! Publishes `{uuid, major, minor, action}` JSON to
//! `<namespace>/<uuid>/<major>/<minor>` with QoS 0. Connection handling and
//! reconnects are left to the rumqttc event loop.
//!
//! The event loop is not tied to the process shutdown signal: it keeps running
//! until [`MqttTransport::close`], so deliveries drained by the broadcaster on
//! shutdown still reach the broker.

use crate::infra::config::Config;
use crate::services::broadcaster::{PresencePayload, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct MqttTransport {
    client: AsyncClient,
    eventloop_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Create the client and spawn its event loop
    pub fn connect(config: &Config) -> Self {
        let client_id = format!("{}-egress-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs()));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

        let eventloop_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_transport_connected");
                    }
                    // Requests are written in order, so everything queued
                    // before the disconnect has been sent
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("mqtt_transport_disconnected");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_transport_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, eventloop_task: Mutex::new(Some(eventloop_task)) }
    }

    /// Flush queued publishes and stop the event loop
    ///
    /// Waits at most `timeout`; when the broker is unreachable anything still
    /// queued is dropped.
    pub async fn close(&self, timeout: Duration) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "mqtt_transport_disconnect_failed");
        }
        let Some(mut task) = self.eventloop_task.lock().take() else {
            return;
        };
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            warn!(timeout_ms = %timeout.as_millis(), "mqtt_transport_flush_timeout");
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: &PresencePayload) -> Result<(), TransportError> {
        let json = serde_json::to_vec(payload)?;
        // Fails fast instead of waiting when the client's request queue is full
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, json)
            .map_err(|e| TransportError::Client(e.to_string()))?;
        debug!(topic = %topic, "mqtt_publish_queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BeaconDefinition, Transition};
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_publish_accepted_after_process_shutdown_signal() {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let transport = MqttTransport::connect(&Config::default());
        shutdown_tx.send(true).unwrap();

        let payload = PresencePayload::new(&BeaconDefinition::new("A", "1", "1"), Transition::Exit);
        assert!(transport.publish("beacon/A/1/1", &payload).await.is_ok());

        transport.close(Duration::from_millis(100)).await;
        assert!(transport.eventloop_task.lock().is_none());
    }
}
