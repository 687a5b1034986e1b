//! Scanner Simulator - publishes scanning-engine callbacks over MQTT
//!
//! Stands in for the BLE scanning engine when testing beacon-mqtt without
//! hardware. Each action becomes one callback message on the scanner topic.
//!
//! Usage:
//!   cargo run --bin scan-sim -- --region A11 --actions enter,exit
//!   cargo run --bin scan-sim -- --region A11 --actions enter,enter,state:1,exit --delay-ms 200

use anyhow::{bail, Context};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Args
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "scan-sim")]
#[command(about = "Publish simulated region callbacks for beacon-mqtt")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Scanner callback topic
    #[arg(long, default_value = "beacon-scanner/callbacks")]
    topic: String,

    /// Region id (uuid + major + minor concatenated)
    #[arg(long)]
    region: String,

    /// Comma-separated actions: enter, exit, state:<n>
    #[arg(long, default_value = "enter,exit")]
    actions: String,

    /// Pause between callbacks
    #[arg(long, default_value = "500")]
    delay_ms: u64,
}

// ============================================================================
// Callback Messages
// ============================================================================

fn callback_message(region: &str, action: &str) -> anyhow::Result<Value> {
    let message = match action {
        "enter" | "exit" => json!({ "callback": action, "region": region }),
        other => match other.strip_prefix("state:") {
            Some(raw) => {
                let state: i32 =
                    raw.parse().with_context(|| format!("invalid state value '{raw}'"))?;
                json!({ "callback": "state", "region": region, "state": state })
            }
            None => bail!("unknown action '{other}'"),
        },
    };
    Ok(message)
}

fn parse_actions(region: &str, actions: &str) -> anyhow::Result<Vec<Value>> {
    actions
        .split(',')
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .map(|action| callback_message(region, action))
        .collect()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_timer(UtcTime::rfc_3339()).with_target(false).init();

    let args = Args::parse();
    let messages = parse_actions(&args.region, &args.actions)?;

    let client_id = format!("scan-sim-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, &args.mqtt_host, args.mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(5));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("scan_sim_connected"),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "scan_sim_mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    for message in &messages {
        let payload = serde_json::to_vec(message)?;
        client
            .publish(args.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .context("Failed to queue callback")?;
        info!(topic = %args.topic, message = %message, "scan_sim_published");
        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    // Give the event loop time to flush the last publish
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.disconnect().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        let messages = parse_actions("A11", "enter, state:1,exit").unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], json!({ "callback": "enter", "region": "A11" }));
        assert_eq!(messages[1], json!({ "callback": "state", "region": "A11", "state": 1 }));
        assert_eq!(messages[2]["callback"], "exit");
    }

    #[test]
    fn test_parse_actions_rejects_unknown() {
        assert!(parse_actions("A11", "enter,wave").is_err());
        assert!(parse_actions("A11", "state:x").is_err());
    }
}
