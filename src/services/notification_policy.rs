//! Local alert decision for delivered presence changes

use crate::domain::types::{BeaconDefinition, Transition};

/// User notification settings, read as a snapshot per decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationConfig {
    pub notify_on_enter: bool,
    pub notify_on_exit: bool,
}

/// A local alert ready for the notification collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

pub struct NotificationPolicy;

impl NotificationPolicy {
    /// Whether a transition of this kind should raise an alert
    pub fn decide(transition: Transition, config: &NotificationConfig) -> bool {
        match transition {
            Transition::Enter => config.notify_on_enter,
            Transition::Exit => config.notify_on_exit,
        }
    }

    /// Build the alert for a transition, if the config asks for one
    pub fn alert(
        transition: Transition,
        beacon: &BeaconDefinition,
        config: &NotificationConfig,
    ) -> Option<Alert> {
        if !Self::decide(transition, config) {
            return None;
        }

        let (title, verb) = match transition {
            Transition::Enter => ("Beacon spotted!", "Entered"),
            Transition::Exit => ("Beacon lost!", "Exited"),
        };
        let mut message = format!(
            "{} region uuid: {}, major: {}, minor: {}",
            verb, beacon.uuid, beacon.major, beacon.minor
        );
        if let Some(name) = beacon.display_name() {
            message = format!("{} {}", name, message);
        }

        Some(Alert { title: title.to_string(), message })
    }
}
