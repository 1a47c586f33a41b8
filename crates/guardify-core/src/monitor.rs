//! Proximity monitoring and the far-alert state machine.
//!
//! While a session is active the monitor polls the connected tag's RSSI on a
//! fixed period, classifies it, and fires alert effects on the *edge* into
//! the far bucket only:
//!
//! ```text
//!              medium / far
//!   ┌────────┐ ───────────► ┌──────────┐
//!   │ normal │              │ alerting │   effects fire on this edge only
//!   └────────┘ ◄─────────── └──────────┘
//!              close / near
//! ```
//!
//! Staying far does not re-alert; coming back only updates the status text.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::alert::{forgotten_message, moving_away_message, AlertSink, ALERT_TITLE};
use crate::bluetooth::PeripheralHandle;
use crate::config::MonitorConfig;
use crate::distance::{classify, DistanceInfo, DistanceLevel};

/// Status text before any session.
pub const STATUS_IDLE: &str = "Not connected";
/// Status text while the object is in range.
pub const STATUS_CONNECTED: &str = "Connected";
/// Status text once the link dropped.
pub const STATUS_DISCONNECTED: &str = "Disconnected";
/// Status text while alerting.
pub const STATUS_FAR: &str = "Object is far away!";

/// Outcome of feeding one bucket to an [`AlertTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// Entered the away buckets: fire the alert.
    FarEntry,
    /// Came back into range: update the status only.
    FarExit,
    /// No edge.
    Unchanged,
}

/// Edge detector over distance buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertTracker {
    alerting: bool,
}

impl AlertTracker {
    /// A tracker in the normal (not alerting) state.
    #[must_use]
    pub const fn new() -> Self {
        Self { alerting: false }
    }

    /// Whether the last observed bucket left the tracker alerting.
    #[must_use]
    pub const fn is_alerting(&self) -> bool {
        self.alerting
    }

    /// Feed one classified bucket.
    pub fn observe(&mut self, level: DistanceLevel) -> AlertTransition {
        match (level.is_away(), self.alerting) {
            (true, false) => {
                self.alerting = true;
                AlertTransition::FarEntry
            }
            (false, true) => {
                self.alerting = false;
                AlertTransition::FarExit
            }
            _ => AlertTransition::Unchanged,
        }
    }

    /// Back to the normal state.
    pub fn reset(&mut self) {
        self.alerting = false;
    }
}

/// Lifecycle of the polling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    /// Never started, or stopped explicitly.
    Idle,
    /// Polling the peripheral.
    Polling,
    /// The link dropped; no further ticks.
    Stopped,
}

/// Externally observable monitor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProximitySnapshot {
    /// Polling lifecycle.
    pub phase: MonitorPhase,

    /// Name of the object being watched.
    #[schema(example = "House keys")]
    pub object_name: Option<String>,

    /// Last successfully read RSSI in dBm.
    #[schema(example = -62)]
    pub rssi: Option<i16>,

    /// Classification of `rssi`.
    pub distance: Option<DistanceInfo>,

    /// Whether the object is currently considered left behind.
    pub alerting: bool,

    /// Human readable status line.
    #[schema(example = "Connected")]
    pub status: String,

    /// Session counter; ticks from an older session are discarded.
    #[serde(skip)]
    pub generation: u64,
}

impl Default for ProximitySnapshot {
    fn default() -> Self {
        Self {
            phase: MonitorPhase::Idle,
            object_name: None,
            rssi: None,
            distance: None,
            alerting: false,
            status: STATUS_IDLE.to_string(),
            generation: 0,
        }
    }
}

/// Shared between the monitor and its polling task.
struct PollContext {
    sink: Arc<dyn AlertSink>,
    config: MonitorConfig,
    snapshot: Arc<watch::Sender<ProximitySnapshot>>,
}

impl PollContext {
    /// Apply `f` if `generation` is still the live session.
    fn update(&self, generation: u64, f: impl FnOnce(&mut ProximitySnapshot)) -> bool {
        let mut live = false;
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            f(snapshot);
            live = true;
            true
        });
        live
    }

    /// Whether `generation` is still the session on screen and `token` has
    /// not been cancelled.
    fn is_live(&self, generation: u64, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.snapshot.borrow().generation == generation
    }

    /// Run the far-entry effects in order. Liveness is re-checked before
    /// each one; an effect already in flight runs to completion.
    async fn fire_alert(&self, object_name: &str, generation: u64, token: &CancellationToken) {
        warn!(object = object_name, "Object left behind, alerting");
        let limit = self.config.sink_timeout();

        if tokio::time::timeout(limit, self.sink.vibrate(&self.config.alert_vibration_ms))
            .await
            .is_err()
        {
            warn!("Vibration request timed out");
        }

        if !self.is_live(generation, token) {
            debug!("Session ended during alert, skipping notification");
            return;
        }
        match tokio::time::timeout(
            limit,
            self.sink.record_notification(&forgotten_message(object_name)),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => debug!("Notification not recorded"),
            Err(_) => warn!("Recording notification timed out"),
        }

        if !self.is_live(generation, token) {
            debug!("Session ended during alert, skipping push");
            return;
        }
        if tokio::time::timeout(
            limit,
            self.sink
                .push_notification(ALERT_TITLE, &moving_away_message(object_name)),
        )
        .await
        .is_err()
        {
            warn!("Push notification timed out");
        }
    }
}

/// Periodic RSSI poller driving the alert state machine.
pub struct ProximityMonitor {
    ctx: Arc<PollContext>,
    task: Mutex<Option<CancellationToken>>,
}

impl ProximityMonitor {
    /// Monitor delivering alerts to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AlertSink>, config: MonitorConfig) -> Self {
        let (snapshot, _) = watch::channel(ProximitySnapshot::default());
        Self {
            ctx: Arc::new(PollContext {
                sink,
                config,
                snapshot: Arc::new(snapshot),
            }),
            task: Mutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> ProximitySnapshot {
        self.ctx.snapshot.borrow().clone()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProximitySnapshot> {
        self.ctx.snapshot.subscribe()
    }

    /// Whether a polling task is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|t| !t.is_cancelled())
            && self.ctx.snapshot.borrow().phase == MonitorPhase::Polling
    }

    /// Start polling `handle` for `object_name`, replacing any previous
    /// session. Resets the alert state. Returns the new session generation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, handle: PeripheralHandle, object_name: impl Into<String>) -> u64 {
        let object_name = object_name.into();
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.task).replace(token.clone()) {
            previous.cancel();
        }

        let mut generation = 0;
        self.ctx.snapshot.send_modify(|snapshot| {
            generation = snapshot.generation + 1;
            *snapshot = ProximitySnapshot {
                phase: MonitorPhase::Polling,
                object_name: Some(object_name.clone()),
                status: STATUS_CONNECTED.to_string(),
                generation,
                ..ProximitySnapshot::default()
            };
        });

        info!(
            object = %object_name,
            id = %handle.id(),
            period_ms = self.ctx.config.poll_interval_ms,
            "Proximity monitoring started"
        );
        tokio::spawn(poll(
            Arc::clone(&self.ctx),
            handle,
            object_name,
            generation,
            token,
        ));
        generation
    }

    /// Stop polling. Idempotent; safe when never started.
    pub fn stop(&self) {
        if let Some(token) = lock(&self.task).take() {
            token.cancel();
            debug!("Proximity monitoring stopped");
        }
        self.ctx.snapshot.send_if_modified(|snapshot| {
            let generation = snapshot.generation + 1;
            let idle = ProximitySnapshot {
                generation: snapshot.generation,
                ..ProximitySnapshot::default()
            };
            let changed = *snapshot != idle;
            // Invalidate any tick still in flight even when nothing visible changes.
            snapshot.generation = generation;
            if changed {
                *snapshot = ProximitySnapshot {
                    generation,
                    ..ProximitySnapshot::default()
                };
            }
            changed
        });
    }
}

impl Drop for ProximityMonitor {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.task).take() {
            token.cancel();
        }
    }
}

async fn poll(
    ctx: Arc<PollContext>,
    handle: PeripheralHandle,
    object_name: String,
    generation: u64,
    token: CancellationToken,
) {
    let period = ctx.config.poll_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tracker = AlertTracker::new();

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !handle.is_connected().await {
            if !token.is_cancelled() {
                info!(object = %object_name, "Peripheral disconnected, monitoring stopped");
                ctx.update(generation, |snapshot| {
                    snapshot.phase = MonitorPhase::Stopped;
                    snapshot.alerting = false;
                    snapshot.status = STATUS_DISCONNECTED.to_string();
                });
            }
            break;
        }

        let reading = tokio::select! {
            biased;
            () = token.cancelled() => break,
            reading = handle.read_rssi() => reading,
        };
        let rssi = match reading {
            Ok(rssi) => rssi,
            Err(e) => {
                debug!(error = %e, "RSSI read failed, retrying next tick");
                continue;
            }
        };

        let distance = classify(rssi);
        let transition = tracker.observe(distance.level);
        let live = ctx.update(generation, |snapshot| {
            snapshot.rssi = Some(rssi);
            snapshot.distance = Some(distance);
            snapshot.alerting = tracker.is_alerting();
            snapshot.status = if tracker.is_alerting() {
                STATUS_FAR.to_string()
            } else {
                STATUS_CONNECTED.to_string()
            };
        });
        if !live || token.is_cancelled() {
            break;
        }

        debug!(rssi, level = %distance.level, "Proximity sample");
        match transition {
            AlertTransition::FarEntry => {
                ctx.fire_alert(&object_name, generation, &token).await;
            }
            AlertTransition::FarExit => info!(object = %object_name, "Object back in range"),
            AlertTransition::Unchanged => {}
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
