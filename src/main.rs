//! beacon-mqtt - BLE region monitoring with MQTT presence broadcast
//!
//! Module structure:
//! - `domain/` - Core types (BeaconDefinition, RegionId, events, identifiers)
//! - `io/` - External interfaces (scanner feed, MQTT transport, beacon file, HTTP)
//! - `services/` - Region registry, state machine, broadcaster
//! - `infra/` - Infrastructure (Config, Metrics)

use beacon_mqtt::infra::{Config, Metrics};
use beacon_mqtt::io::{reload_registry, LogNotifier, LogObserver, MqttTransport};
use beacon_mqtt::services::{
    create_monitor, EventBroadcaster, MonitorHandle, NotificationConfig, ProximityAdapter,
    SnapshotStore,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const TRANSPORT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Beacon region monitor publishing enter/exit presence over MQTT
#[derive(Parser, Debug)]
#[command(name = "beacon-mqtt", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "beacon-mqtt starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        namespace = %config.topic_namespace(),
        scanner_topic = %config.scanner_topic(),
        beacons_file = %config.beacons_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (notify_tx, notify_rx) = watch::channel(config.notification_config());

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(SnapshotStore::default());
    let (monitor, dispatch_rx) = create_monitor(metrics.clone());

    // Regions must be installed before the first scanner callback arrives
    if let Err(e) = reload_registry(config.beacons_file(), &store, &monitor) {
        warn!(error = %format!("{e:#}"), "beacon_registry_load_failed");
    }

    let transport = Arc::new(MqttTransport::connect(&config));
    let broadcaster = EventBroadcaster::new(
        store.clone(),
        transport.clone(),
        Arc::new(LogNotifier),
        notify_rx,
        config.topic_namespace(),
        metrics.clone(),
    )
    .with_observer(Arc::new(LogObserver));

    let broadcaster_shutdown = shutdown_rx.clone();
    let broadcaster_task = tokio::spawn(async move {
        broadcaster.run(dispatch_rx, broadcaster_shutdown).await;
    });

    // Scanner feed drives the adapter from the MQTT event loop
    let adapter = ProximityAdapter::new(monitor.clone(), metrics.clone());
    let feed_config = config.clone();
    let feed_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            beacon_mqtt::io::start_scanner_feed(&feed_config, adapter, feed_shutdown).await
        {
            error!(error = %e, "scanner_feed_failed");
        }
    });

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_monitor = monitor.clone();
        let prom_client = config.mqtt_client_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = beacon_mqtt::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_monitor,
                prom_client,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_metrics_server_failed");
            }
        });
    }

    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    #[cfg(unix)]
    {
        let reload_path = config_path.clone();
        let reload_store = store.clone();
        let reload_monitor = monitor.clone();
        tokio::spawn(async move {
            if let Err(e) =
                watch_reload_signal(reload_path, reload_store, reload_monitor, notify_tx).await
            {
                error!(error = %e, "reload_signal_failed");
            }
        });
    }
    #[cfg(not(unix))]
    drop(notify_tx);

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    // Let the broadcaster drain already-queued deliveries, then flush them
    if let Err(e) = broadcaster_task.await {
        error!(error = %e, "broadcaster_task_failed");
    }
    transport.close(TRANSPORT_FLUSH_TIMEOUT).await;

    info!("beacon-mqtt shutdown complete");
    Ok(())
}

/// Re-read notification settings and the beacon registry on SIGHUP
#[cfg(unix)]
async fn watch_reload_signal(
    config_path: String,
    store: Arc<SnapshotStore>,
    monitor: MonitorHandle,
    notify_tx: watch::Sender<NotificationConfig>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    while hangup.recv().await.is_some() {
        info!(config_file = %config_path, "reload_signal_received");
        let config = match Config::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_reload_failed");
                continue;
            }
        };
        notify_tx.send_replace(config.notification_config());
        match reload_registry(config.beacons_file(), &store, &monitor) {
            Ok(regions) => info!(regions = %regions, "reload_complete"),
            Err(e) => warn!(error = %format!("{e:#}"), "beacon_registry_load_failed"),
        }
    }
    Ok(())
}
