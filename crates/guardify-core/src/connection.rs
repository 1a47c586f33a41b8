//! Peripheral connection manager.
//!
//! One process-wide instance owns the radio: it scans for the tag by
//! advertised name, connects and resolves the command characteristic, and
//! releases everything on teardown.
//!
//! ```text
//!   Idle ──start_scan──► Scanning ──match──► Idle ──connect──► Connecting ──► Connected
//!    ▲                      │ timeout/cancel                      │ failure        │
//!    │                      ▼                                     ▼                ▼
//!    └───────teardown─── Idle / Error ◄─────────────────────── Error        Disconnected
//! ```
//!
//! The stale-connection dance (drop a link the stack still reports as up,
//! settle, reconnect, rediscover) lives in one place, [`ConnectionManager::reconnect`],
//! and is reused by the initial connect and the command channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bluetooth::{
    Advertisement, BluetoothError, BluetoothResult, ConnectionState, Peripheral, PeripheralHandle,
    Radio,
};
use crate::config::BluetoothConfig;

/// In-flight scan: identifier plus its cancellation token.
struct ScanSlot {
    id: u64,
    token: CancellationToken,
}

/// Owner of the radio and of the single active peripheral handle.
pub struct ConnectionManager {
    radio: Arc<dyn Radio>,
    config: BluetoothConfig,
    state: watch::Sender<ConnectionState>,
    scan: Mutex<Option<ScanSlot>>,
    next_scan_id: AtomicU64,
    active: Mutex<Option<PeripheralHandle>>,
}

impl ConnectionManager {
    /// Create the manager for `radio`.
    #[must_use]
    pub fn new(radio: Arc<dyn Radio>, config: BluetoothConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            radio,
            config,
            state,
            scan: Mutex::new(None),
            next_scan_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    /// Radio configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BluetoothConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The connected handle, if any.
    #[must_use]
    pub fn active(&self) -> Option<PeripheralHandle> {
        lock(&self.active).clone()
    }

    /// Whether a scan is in flight.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        lock(&self.scan).is_some()
    }

    /// Scan for the configured peripheral name.
    ///
    /// Requests permissions first, cancels any scan already in flight, and
    /// stops at the first matching advertisement. Later advertisements are
    /// never looked at.
    ///
    /// # Errors
    ///
    /// - [`BluetoothError::PermissionDenied`] if the platform refuses
    /// - [`BluetoothError::ScanTimeout`] if nothing matched in time
    /// - [`BluetoothError::ScanCancelled`] if another scan or a teardown
    ///   cancelled this one
    /// - any discovery failure from the radio
    pub async fn start_scan(&self) -> BluetoothResult<Advertisement> {
        let permission = self.radio.request_permissions().await;
        if !permission.allows_scan() {
            warn!("Bluetooth permission denied, not scanning");
            self.set_state(ConnectionState::Error);
            return Err(BluetoothError::PermissionDenied);
        }

        let restarted = self.stop_scan();
        let id = self.next_scan_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        *lock(&self.scan) = Some(ScanSlot {
            id,
            token: token.clone(),
        });
        self.set_state(ConnectionState::Scanning);

        if restarted {
            tokio::select! {
                () = token.cancelled() => {
                    self.finish_scan(id);
                    return Err(BluetoothError::ScanCancelled);
                }
                () = tokio::time::sleep(self.config.scan_restart_delay()) => {}
            }
        }

        let name = self.config.peripheral_name.clone();
        let timeout = self.config.scan_timeout();
        info!(name = %name, timeout_secs = timeout.as_secs(), "Scanning for peripheral");

        let result = match tokio::time::timeout(timeout, self.scan_until_match(&name, &token)).await
        {
            Ok(result) => result,
            Err(_) => Err(BluetoothError::ScanTimeout {
                name,
                duration_secs: timeout.as_secs(),
            }),
        };

        let still_current = self.finish_scan(id);
        match &result {
            Ok(advertisement) => {
                info!(id = %advertisement.peripheral.id(), rssi = ?advertisement.rssi, "Peripheral found");
                if still_current {
                    self.set_state(ConnectionState::Idle);
                }
            }
            Err(BluetoothError::ScanCancelled) => debug!("Scan cancelled"),
            Err(e @ BluetoothError::ScanTimeout { .. }) => {
                info!("{e}");
                if still_current {
                    self.set_state(ConnectionState::Idle);
                }
            }
            Err(e) => {
                warn!(error = %e, "Scan failed");
                if still_current {
                    self.set_state(ConnectionState::Error);
                }
            }
        }
        result
    }

    async fn scan_until_match(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> BluetoothResult<Advertisement> {
        let mut advertisements = tokio::select! {
            () = token.cancelled() => return Err(BluetoothError::ScanCancelled),
            stream = self.radio.discover() => stream?,
        };

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(BluetoothError::ScanCancelled),
                next = advertisements.next() => match next {
                    Some(advertisement) if advertisement.matches_name(name) => {
                        return Ok(advertisement);
                    }
                    Some(advertisement) => {
                        debug!(name = ?advertisement.name, "Ignoring advertisement");
                    }
                    None => {
                        return Err(BluetoothError::DiscoveryFailed {
                            reason: "discovery stream ended".into(),
                        });
                    }
                },
            }
        }
    }

    /// Cancel the in-flight scan, if any. Returns whether one was cancelled.
    pub fn stop_scan(&self) -> bool {
        lock(&self.scan).take().is_some_and(|slot| {
            slot.token.cancel();
            true
        })
    }

    /// Clear the scan slot if it still belongs to scan `id`.
    fn finish_scan(&self, id: u64) -> bool {
        let mut slot = lock(&self.scan);
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Connect to a discovered peripheral and make it the active handle.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::ConnectionFailed`] or
    /// [`BluetoothError::ServiceDiscoveryFailed`]; no automatic retry.
    pub async fn connect(&self, peripheral: Arc<dyn Peripheral>) -> BluetoothResult<PeripheralHandle> {
        let handle = PeripheralHandle::new(peripheral, self.config.command_address());
        self.reconnect(&handle).await?;
        Ok(handle)
    }

    /// (Re)establish the link for `handle` and make it the active handle.
    ///
    /// A peripheral that still reports a connection is disconnected first and
    /// given a short settle delay: stacks occasionally report stale links.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::ConnectionFailed`] or
    /// [`BluetoothError::ServiceDiscoveryFailed`].
    pub async fn reconnect(&self, handle: &PeripheralHandle) -> BluetoothResult<()> {
        self.set_state(ConnectionState::Connecting);
        info!(id = %handle.id(), "Connecting");

        match self.establish(handle).await {
            Ok(()) => {
                *lock(&self.active) = Some(handle.clone());
                self.set_state(ConnectionState::Connected);
                info!(id = %handle.id(), "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(id = %handle.id(), error = %e, "Connection failed");
                self.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn establish(&self, handle: &PeripheralHandle) -> BluetoothResult<()> {
        let peripheral = handle.peripheral();

        if peripheral.is_connected().await.unwrap_or(false) {
            debug!(id = %handle.id(), "Dropping stale connection before reconnecting");
            if let Err(e) = peripheral.disconnect().await {
                debug!(error = %e, "Stale disconnect failed, continuing");
            }
            tokio::time::sleep(self.config.reconnect_settle()).await;
        }

        peripheral.connect().await.map_err(|e| match e {
            BluetoothError::ConnectionFailed { .. } => e,
            other => BluetoothError::ConnectionFailed {
                reason: other.to_string(),
            },
        })?;

        peripheral
            .discover_services(handle.address())
            .await
            .map_err(|e| match e {
                BluetoothError::ServiceDiscoveryFailed { .. }
                | BluetoothError::CharacteristicNotFound { .. } => e,
                other => BluetoothError::ServiceDiscoveryFailed {
                    reason: other.to_string(),
                },
            })
    }

    /// Disconnect `handle`. Always safe: teardown errors are swallowed.
    pub async fn disconnect(&self, handle: &PeripheralHandle) {
        if let Err(e) = handle.peripheral().disconnect().await {
            debug!(id = %handle.id(), error = %e, "Disconnect failed, ignoring");
        }

        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|a| a.id() == handle.id()) {
            *active = None;
            drop(active);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Release everything: cancel the scan, disconnect the active handle.
    ///
    /// Idempotent; runs on every session exit, successful or not.
    pub async fn teardown(&self) {
        if self.stop_scan() {
            debug!("Teardown cancelled in-flight scan");
        }

        let active = lock(&self.active).take();
        if let Some(handle) = active {
            info!(id = %handle.id(), "Teardown disconnecting peripheral");
            if let Err(e) = handle.peripheral().disconnect().await {
                debug!(error = %e, "Disconnect failed during teardown, ignoring");
            }
        }
        self.set_state(ConnectionState::Idle);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
