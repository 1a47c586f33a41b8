//! Alert delivery: vibration, notification history, push notifications.
//!
//! The proximity monitor only talks to the [`AlertSink`] trait. Every call is
//! fire-and-forget from its point of view: failures are logged here and never
//! reach the alert state machine.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::objects::NotificationLog;

/// Title used for far-entry push notifications.
pub const ALERT_TITLE: &str = "⚠️ Guardify";

/// Capacity of the alert event channel.
const EVENT_CAPACITY: usize = 64;

/// Side effects the monitor triggers on a far-entry edge.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Vibrate with an on/off pattern in milliseconds.
    async fn vibrate(&self, pattern_ms: &[u64]);

    /// Persist a notification record. Returns whether it was stored.
    async fn record_notification(&self, message: &str) -> bool;

    /// Request a push notification. May silently do nothing.
    async fn push_notification(&self, title: &str, body: &str);
}

/// Message persisted when the tagged object is left behind.
#[must_use]
pub fn forgotten_message(object_name: &str) -> String {
    format!("You forgot \"{object_name}\"!")
}

/// Push body sent when the tagged object is left behind.
#[must_use]
pub fn moving_away_message(object_name: &str) -> String {
    format!("You are moving away from \"{object_name}\"!")
}

/// An alert effect, as seen by subscribers (e.g. a connected UI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// The device should vibrate.
    Vibrate {
        /// On/off pattern in milliseconds.
        pattern_ms: Vec<u64>,
    },
    /// A push notification should be shown.
    Push {
        /// Notification title.
        title: String,
        /// Notification body.
        body: String,
    },
}

/// Sink that persists notifications locally and broadcasts vibration and
/// push requests to subscribers.
pub struct LocalAlertSink {
    notifications: NotificationLog,
    events: broadcast::Sender<AlertEvent>,
    push_enabled: bool,
}

impl LocalAlertSink {
    /// Create a sink writing to `notifications`.
    #[must_use]
    pub fn new(notifications: NotificationLog, push_enabled: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            notifications,
            events,
            push_enabled,
        }
    }

    /// Subscribe to vibration and push events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AlertEvent) {
        // No subscribers is normal (headless); the event is simply dropped.
        if self.events.send(event).is_err() {
            debug!("Alert event dropped, no subscribers");
        }
    }
}

#[async_trait]
impl AlertSink for LocalAlertSink {
    async fn vibrate(&self, pattern_ms: &[u64]) {
        info!(?pattern_ms, "Vibrate");
        self.emit(AlertEvent::Vibrate {
            pattern_ms: pattern_ms.to_vec(),
        });
    }

    async fn record_notification(&self, message: &str) -> bool {
        match self.notifications.add(message) {
            Ok(record) => {
                debug!(id = %record.id, "Notification recorded");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to record notification");
                false
            }
        }
    }

    async fn push_notification(&self, title: &str, body: &str) {
        if !self.push_enabled {
            debug!("Push notifications disabled, skipping");
            return;
        }
        info!(title, body, "Push notification");
        self.emit(AlertEvent::Push {
            title: title.to_string(),
            body: body.to_string(),
        });
    }
}
