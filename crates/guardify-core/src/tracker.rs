//! Tracking sessions.
//!
//! The [`Tracker`] ties the pieces together the way the app's screens use
//! them: a discovery scan before adding an object, a locate session that
//! connects and monitors, buzzer commands against the live link, and a
//! teardown on every exit path.
//!
//! Only one session owns the radio at a time. Entering a new session first
//! releases everything the previous one held, in a fixed order:
//! stop the monitor, cancel the scan, disconnect the tag.
//!
//! Every session gets a generation number. A request that finds its
//! generation replaced after an await releases what it acquired and
//! reports [`GuardifyError::SessionSuperseded`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::alert::{AlertEvent, AlertSink, LocalAlertSink};
use crate::bluetooth::{BluetoothError, Radio};
use crate::command::{BuzzerCommand, CommandChannel};
use crate::config::GuardifyConfig;
use crate::connection::ConnectionManager;
use crate::distance::classify;
use crate::error::{GuardifyError, Result};
use crate::monitor::{MonitorPhase, ProximityMonitor};
use crate::objects::{
    NotificationLog, NotificationRecord, ObjectCategory, ObjectError, ObjectRegistry,
    TrackedObject,
};
use crate::storage::Storage;
use crate::types::{DiscoveredPeripheral, TrackingStatus};

/// Session orchestrator over one radio.
pub struct Tracker {
    connections: Arc<ConnectionManager>,
    monitor: ProximityMonitor,
    commands: CommandChannel,
    objects: ObjectRegistry,
    notifications: NotificationLog,
    alerts: Arc<LocalAlertSink>,
    generation: AtomicU64,
    session: tokio::sync::Mutex<()>,
    tracked: Mutex<Option<TrackedObject>>,
    discovered: Mutex<Option<DiscoveredPeripheral>>,
    last_error: Mutex<Option<String>>,
}

impl Tracker {
    /// Tracker over `radio`, persisting to the configured data directory.
    #[must_use]
    pub fn from_config(radio: Arc<dyn Radio>, config: &GuardifyConfig) -> Self {
        Self::new(radio, config, Storage::from_config(&config.storage))
    }

    /// Tracker over `radio`, persisting to `storage`.
    #[must_use]
    pub fn new(radio: Arc<dyn Radio>, config: &GuardifyConfig, storage: Storage) -> Self {
        let notifications = NotificationLog::new(storage.clone());
        let alerts = Arc::new(LocalAlertSink::new(
            notifications.clone(),
            config.alerts.push_enabled,
        ));
        let connections = Arc::new(ConnectionManager::new(radio, config.bluetooth.clone()));
        let sink: Arc<dyn AlertSink> = alerts.clone();

        Self {
            monitor: ProximityMonitor::new(sink, config.monitor.clone()),
            commands: CommandChannel::new(Arc::clone(&connections)),
            connections,
            objects: ObjectRegistry::new(storage),
            notifications,
            alerts,
            generation: AtomicU64::new(0),
            session: tokio::sync::Mutex::new(()),
            tracked: Mutex::new(None),
            discovered: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Scan for the tag without connecting (add-object flow).
    ///
    /// A successful discovery enables exactly one [`Tracker::add_object`].
    ///
    /// # Errors
    ///
    /// Returns the scan failure (permission, timeout, ...) or
    /// [`GuardifyError::SessionSuperseded`].
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<DiscoveredPeripheral> {
        let generation = self.enter_session();
        let _session = self.session.lock().await;
        self.ensure_current(generation)?;
        self.release().await;
        lock(&self.discovered).take();

        let advertisement = self
            .connections
            .start_scan()
            .await
            .map_err(|e| self.session_failed(generation, e))?;
        self.ensure_current(generation)?;

        let discovered = DiscoveredPeripheral {
            id: advertisement.peripheral.id(),
            name: advertisement.name.clone(),
            rssi: advertisement.rssi,
            distance: advertisement.rssi.map(classify),
        };
        info!(id = %discovered.id, "Tag discovered, ready to add an object");
        *lock(&self.discovered) = Some(discovered.clone());
        lock(&self.last_error).take();
        Ok(discovered)
    }

    /// Start tracking: scan, connect and monitor proximity.
    ///
    /// With an `object_id` the session is labelled with that object's name,
    /// otherwise with the peripheral name.
    ///
    /// # Errors
    ///
    /// - [`GuardifyError::ObjectNotFound`] for an unknown object
    /// - scan and connection failures
    /// - [`GuardifyError::SessionSuperseded`] if another request took over
    #[instrument(skip(self))]
    pub async fn locate(&self, object_id: Option<&str>) -> Result<TrackingStatus> {
        let object = object_id.map(|id| self.objects.get(id)).transpose()?;

        let generation = self.enter_session();
        let _session = self.session.lock().await;
        self.ensure_current(generation)?;
        self.release().await;

        let label = object
            .as_ref()
            .map_or_else(|| self.connections.config().peripheral_name.clone(), |o| o.name.clone());
        *lock(&self.tracked) = object;

        let advertisement = self
            .connections
            .start_scan()
            .await
            .map_err(|e| self.session_failed(generation, e))?;
        self.ensure_current(generation)?;

        let handle = self
            .connections
            .connect(advertisement.peripheral)
            .await
            .map_err(|e| self.session_failed(generation, e))?;
        if let Err(e) = self.ensure_current(generation) {
            debug!("Session superseded while connecting, releasing tag");
            self.connections.disconnect(&handle).await;
            return Err(e);
        }

        self.monitor.start(handle, label);
        lock(&self.last_error).take();
        Ok(self.status())
    }

    /// Send a buzzer command to the tag, reconnecting once if needed.
    ///
    /// # Errors
    ///
    /// Returns the command failure; see [`CommandChannel::send`].
    #[instrument(skip(self))]
    pub async fn buzz(&self, command: BuzzerCommand) -> Result<()> {
        let _session = self.session.lock().await;
        let active = self.connections.active();
        self.commands.send(active.as_ref(), command).await?;
        Ok(())
    }

    /// End the current session. Idempotent.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.enter_session();
        let _session = self.session.lock().await;
        self.release().await;
        lock(&self.last_error).take();
        info!("Tracking stopped");
    }

    /// Bump the generation and interrupt whatever the current session is
    /// waiting on, so it lets go of the session lock quickly.
    fn enter_session(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.monitor.stop();
        self.connections.stop_scan();
        generation
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(GuardifyError::SessionSuperseded)
        }
    }

    /// Map a radio failure, preferring `SessionSuperseded` when a newer
    /// request caused it.
    fn session_failed(&self, generation: u64, error: BluetoothError) -> GuardifyError {
        if self.ensure_current(generation).is_err() {
            return GuardifyError::SessionSuperseded;
        }
        let error = GuardifyError::from(error);
        if error.is_expected_state() {
            info!("{error}");
        } else {
            warn!(error = %error, "Tracking session failed");
        }
        *lock(&self.last_error) = Some(error.to_string());
        error
    }

    /// Stop timer, cancel scan, disconnect. Caller holds the session lock.
    async fn release(&self) {
        self.monitor.stop();
        self.connections.teardown().await;
        lock(&self.tracked).take();
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    /// Snapshot of the current session.
    #[must_use]
    pub fn status(&self) -> TrackingStatus {
        let proximity = self.monitor.snapshot();
        let active = self.connections.active();
        let connection = if proximity.phase == MonitorPhase::Stopped {
            crate::bluetooth::ConnectionState::Disconnected
        } else {
            self.connections.state()
        };

        TrackingStatus {
            connection,
            peripheral_id: active.map(|handle| handle.id()),
            object: lock(&self.tracked).clone(),
            proximity,
            last_error: lock(&self.last_error).clone(),
        }
    }

    /// Subscribe to vibration and push events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe()
    }

    // =========================================================================
    // OBJECTS & NOTIFICATIONS
    // =========================================================================

    /// All tracked objects.
    #[must_use]
    pub fn list_objects(&self) -> Vec<TrackedObject> {
        self.objects.list()
    }

    /// One tracked object.
    ///
    /// # Errors
    ///
    /// Returns [`GuardifyError::ObjectNotFound`].
    pub fn get_object(&self, id: &str) -> Result<TrackedObject> {
        Ok(self.objects.get(id)?)
    }

    /// Add an object for the tag found by the last [`Tracker::discover`].
    ///
    /// # Errors
    ///
    /// Returns [`GuardifyError::PeripheralNotDiscovered`] without a prior
    /// discovery, or a validation/persistence error.
    pub fn add_object(&self, name: &str, category: ObjectCategory) -> Result<TrackedObject> {
        let mut discovered = lock(&self.discovered);
        if discovered.is_none() {
            return Err(ObjectError::PeripheralNotDiscovered.into());
        }
        let object = self.objects.add(name, category)?;
        discovered.take();
        Ok(object)
    }

    /// Delete an object, ending the session first if it is tracking it.
    ///
    /// # Errors
    ///
    /// Returns [`GuardifyError::ObjectNotFound`] or a persistence error.
    pub async fn delete_object(&self, id: &str) -> Result<TrackedObject> {
        let tracking = lock(&self.tracked).as_ref().is_some_and(|o| o.id == id);
        if tracking {
            info!(id, "Deleting the tracked object, ending session");
            self.stop().await;
        }
        Ok(self.objects.delete(id)?)
    }

    /// Notification history, newest first.
    #[must_use]
    pub fn list_notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.list()
    }

    /// Clear the notification history.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub fn clear_notifications(&self) -> Result<()> {
        Ok(self.notifications.clear()?)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::bluetooth::mock::{MockPeripheral, MockRadio};
    use crate::bluetooth::ConnectionState;

    struct Fixture {
        _dir: tempfile::TempDir,
        radio: Arc<MockRadio>,
        tag: Arc<MockPeripheral>,
        tracker: Arc<Tracker>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let radio = Arc::new(MockRadio::new());
            let tracker = Arc::new(Tracker::new(
                radio.clone(),
                &GuardifyConfig::default(),
                Storage::new(dir.path()),
            ));
            Self {
                _dir: dir,
                radio,
                tag: Arc::new(MockPeripheral::new("AA:BB:CC:DD:EE:FF")),
                tracker,
            }
        }

        fn advertise_tag(&self) {
            self.radio
                .advertise(Duration::from_millis(300), Some("Guardify"), self.tag.clone());
        }

        async fn add_object(&self, name: &str) -> TrackedObject {
            self.tracker.discover().await.unwrap();
            self.tracker.add_object(name, ObjectCategory::Keys).unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_object_requires_discovery() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.tracker.add_object("Keys", ObjectCategory::Keys),
            Err(GuardifyError::PeripheralNotDiscovered)
        ));

        fx.advertise_tag();
        let found = fx.tracker.discover().await.unwrap();
        assert_eq!(found.id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(fx.tag.connect_calls(), 0);

        // Invalid names do not consume the discovery.
        assert_err!(fx.tracker.add_object("  ", ObjectCategory::Keys));
        assert_ok!(fx.tracker.add_object("Keys", ObjectCategory::Keys));
        assert!(matches!(
            fx.tracker.add_object("Wallet", ObjectCategory::Wallet),
            Err(GuardifyError::PeripheralNotDiscovered)
        ));
        assert_eq!(fx.tracker.list_objects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_connects_and_monitors() {
        let fx = Fixture::new();
        fx.advertise_tag();
        let keys = fx.add_object("Keys").await;

        let status = fx.tracker.locate(Some(&keys.id)).await.unwrap();
        assert_eq!(status.connection, ConnectionState::Connected);
        assert_eq!(status.peripheral_id.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(status.object.unwrap().id, keys.id);
        assert_eq!(status.proximity.phase, MonitorPhase::Polling);
        assert_eq!(status.proximity.object_name.as_deref(), Some("Keys"));

        fx.tag.push_rssi([-90]);
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let status = fx.tracker.status();
        assert!(status.proximity.alerting);

        let history = fx.tracker.list_notifications();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "You forgot \"Keys\"!");

        fx.tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_unknown_object() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.tracker.locate(Some("missing")).await,
            Err(GuardifyError::ObjectNotFound(_))
        ));
        assert_eq!(fx.radio.discover_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_without_tag_reports_timeout() {
        let fx = Fixture::new();
        let err = fx.tracker.locate(None).await.unwrap_err();
        assert!(matches!(err, GuardifyError::PeripheralNotFound { .. }));

        let status = fx.tracker.status();
        assert_eq!(status.connection, ConnectionState::Idle);
        assert!(status.last_error.unwrap().contains("15 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_tears_down_previous() {
        let fx = Fixture::new();
        fx.advertise_tag();
        fx.tracker.locate(None).await.unwrap();
        assert_eq!(fx.tag.disconnect_calls(), 0);

        fx.tracker.locate(None).await.unwrap();
        assert_eq!(fx.tag.disconnect_calls(), 1);
        assert_eq!(fx.tag.connect_calls(), 2);
        assert_eq!(fx.tracker.status().connection, ConnectionState::Connected);

        fx.tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_supersedes_pending_locate() {
        let fx = Fixture::new();
        let pending = tokio::spawn({
            let tracker = fx.tracker.clone();
            async move { tracker.locate(None).await }
        });
        tokio::time::sleep(Duration::from_secs(3)).await;

        fx.tracker.stop().await;

        assert!(matches!(
            pending.await.unwrap(),
            Err(GuardifyError::SessionSuperseded)
        ));
        assert_eq!(fx.tracker.status().connection, ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let fx = Fixture::new();
        fx.tracker.stop().await;

        fx.advertise_tag();
        fx.tracker.locate(None).await.unwrap();
        fx.tracker.stop().await;
        fx.tracker.stop().await;

        assert_eq!(fx.tag.disconnect_calls(), 1);
        let status = fx.tracker.status();
        assert_eq!(status.connection, ConnectionState::Idle);
        assert_eq!(status.proximity.phase, MonitorPhase::Idle);
        assert!(status.peripheral_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_tracked_object_ends_session() {
        let fx = Fixture::new();
        fx.advertise_tag();
        let keys = fx.add_object("Keys").await;
        fx.tracker.locate(Some(&keys.id)).await.unwrap();

        fx.tracker.delete_object(&keys.id).await.unwrap();

        assert_eq!(fx.tag.disconnect_calls(), 1);
        assert!(fx.tracker.status().object.is_none());
        assert!(fx.tracker.list_objects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buzz_without_session_connects_first() {
        let fx = Fixture::new();
        fx.advertise_tag();

        fx.tracker.buzz(BuzzerCommand::On).await.unwrap();
        fx.tracker.buzz(BuzzerCommand::Off).await.unwrap();

        assert_eq!(fx.tag.connect_calls(), 1);
        assert_eq!(fx.tag.writes(), vec![b"ON".to_vec(), b"OFF".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_events_are_broadcast() {
        let fx = Fixture::new();
        fx.advertise_tag();
        let mut events = fx.tracker.subscribe();
        fx.tag.push_rssi([-95]);

        fx.tracker.locate(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            AlertEvent::Vibrate { .. }
        ));
        assert!(matches!(events.recv().await.unwrap(), AlertEvent::Push { .. }));
        fx.tracker.stop().await;
    }

    #[tokio::test]
    async fn test_clear_notifications() {
        let fx = Fixture::new();
        fx.tracker.notifications.add("alert").unwrap();
        assert_eq!(fx.tracker.list_notifications().len(), 1);
        fx.tracker.clear_notifications().unwrap();
        assert!(fx.tracker.list_notifications().is_empty());
    }
}
