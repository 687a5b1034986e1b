//! Fans delivered presence changes out to the transport, local alerts and
//! in-range observers
//!
//! Runs as its own task off the monitor's dispatch queue, so slow publishes
//! never hold up scanning-engine callbacks. Delivery to the transport is
//! at-most-once: failures are logged and counted, never retried.

use crate::domain::types::{BeaconDefinition, DeliveredEvent, Transition};
use crate::infra::metrics::Metrics;
use crate::services::notification_policy::{Alert, NotificationConfig, NotificationPolicy};
use crate::services::region_monitor::{Dispatch, DispatchReceiver};
use crate::services::registry::BeaconStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish rejected by client: {0}")]
    Client(String),
}

/// Presence message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresencePayload {
    pub uuid: String,
    pub major: String,
    pub minor: String,
    pub action: Transition,
}

impl PresencePayload {
    pub fn new(beacon: &BeaconDefinition, action: Transition) -> Self {
        Self {
            uuid: beacon.uuid.clone(),
            major: beacon.major.clone(),
            minor: beacon.minor.clone(),
            action,
        }
    }
}

/// `<namespace>/<uuid>/<major>/<minor>`
pub fn presence_topic(namespace: &str, beacon: &BeaconDefinition) -> String {
    format!(
        "{}/{}/{}/{}",
        namespace.trim_end_matches('/'),
        beacon.uuid,
        beacon.major,
        beacon.minor
    )
}

/// Publish-subscribe client used to report presence changes
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: &PresencePayload) -> Result<(), TransportError>;
}

/// Raises local alerts
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Receives a copy of the in-range set after every change
pub trait InRangeObserver: Send + Sync {
    fn on_in_range_changed(&self, snapshot: &[BeaconDefinition]);
}

/// What happened to a single delivered event
#[derive(Debug)]
pub struct BroadcastReport {
    /// False when the beacon was no longer in the registry
    pub resolved: bool,
    pub publish: Option<Result<(), TransportError>>,
    pub alert: Option<Alert>,
    pub observers_notified: usize,
}

pub struct EventBroadcaster {
    store: Arc<dyn BeaconStore>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    observers: Vec<Arc<dyn InRangeObserver>>,
    notification_config: watch::Receiver<NotificationConfig>,
    namespace: String,
    metrics: Arc<Metrics>,
}

impl EventBroadcaster {
    pub fn new(
        store: Arc<dyn BeaconStore>,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        notification_config: watch::Receiver<NotificationConfig>,
        namespace: &str,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            transport,
            notifier,
            observers: Vec::new(),
            notification_config,
            namespace: namespace.to_string(),
            metrics,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn InRangeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Process dispatches until the queue closes or shutdown is signalled
    pub async fn run(self, mut rx: DispatchReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(namespace = %self.namespace, observers = %self.observers.len(), "broadcaster_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("broadcaster_shutdown");
                        while let Ok(dispatch) = rx.try_recv() {
                            self.handle(dispatch).await;
                        }
                        return;
                    }
                }
                dispatch = rx.recv() => {
                    match dispatch {
                        Some(dispatch) => self.handle(dispatch).await,
                        None => break,
                    }
                }
            }
        }

        info!("broadcaster_stopped");
    }

    async fn handle(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Delivered(event) => {
                self.on_delivered(&event).await;
            }
            Dispatch::Rebuilt { generation, in_range } => {
                debug!(generation = %generation, "broadcaster_regions_rebuilt");
                self.notify_observers(&in_range);
            }
        }
    }

    /// Resolve, publish, alert and notify observers for one presence change
    ///
    /// A beacon missing from the registry stops the event after logging; the
    /// next delivery carries the current in-range snapshot.
    pub async fn on_delivered(&self, event: &DeliveredEvent) -> BroadcastReport {
        let beacon = &event.beacon;
        let Some(resolved) = self.store.get_beacon(&beacon.uuid, &beacon.major, &beacon.minor)
        else {
            warn!(
                region_id = %event.region_id,
                transition = %event.transition.as_str(),
                "beacon_not_in_registry"
            );
            self.metrics.record_resolution_miss();
            return BroadcastReport { resolved: false, publish: None, alert: None, observers_notified: 0 };
        };

        let topic = presence_topic(&self.namespace, &resolved);
        let payload = PresencePayload::new(&resolved, event.transition);
        let publish = self.transport.publish(&topic, &payload).await;
        match &publish {
            Ok(()) => {
                debug!(topic = %topic, action = %event.transition.as_str(), "presence_published");
                self.metrics.record_publish(true);
            }
            Err(e) => {
                warn!(topic = %topic, action = %event.transition.as_str(), error = %e, "publish_failed");
                self.metrics.record_publish(false);
            }
        }

        let config = *self.notification_config.borrow();
        let alert = NotificationPolicy::alert(event.transition, &resolved, &config);
        if let Some(ref alert) = alert {
            self.notifier.notify(&alert.title, &alert.message);
            self.metrics.record_notification();
        }

        let observers_notified = self.notify_observers(&event.in_range);

        BroadcastReport { resolved: true, publish: Some(publish), alert, observers_notified }
    }

    fn notify_observers(&self, snapshot: &[BeaconDefinition]) -> usize {
        for observer in &self.observers {
            observer.on_in_range_changed(snapshot);
        }
        self.observers.len()
    }
}
