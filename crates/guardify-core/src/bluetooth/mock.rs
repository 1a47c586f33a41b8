//! Scripted in-memory radio and peripheral.
//!
//! Used by the unit tests and by the server when built with
//! `mock-bluetooth`. Every interaction is counted so tests can assert on
//! exactly how often the radio was touched.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use super::{
    Advertisement, BluetoothError, BluetoothResult, CharacteristicAddress, PermissionStatus,
    Peripheral, Radio,
};

/// A scripted advertisement: emitted `after` the previous one.
#[derive(Clone)]
struct ScriptedAdvertisement {
    after: Duration,
    advertisement: Advertisement,
}

/// In-memory [`Radio`].
pub struct MockRadio {
    permission: Mutex<PermissionStatus>,
    script: Mutex<Vec<ScriptedAdvertisement>>,
    discover_error: Mutex<Option<BluetoothError>>,
    discover_calls: AtomicUsize,
    permission_requests: AtomicUsize,
}

impl MockRadio {
    /// A radio that grants permissions and advertises nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permission: Mutex::new(PermissionStatus::Granted),
            script: Mutex::new(Vec::new()),
            discover_error: Mutex::new(None),
            discover_calls: AtomicUsize::new(0),
            permission_requests: AtomicUsize::new(0),
        }
    }

    /// Queue an advertisement emitted `after` the previous one on every scan.
    pub fn advertise(&self, after: Duration, name: Option<&str>, peripheral: Arc<MockPeripheral>) {
        let rssi = peripheral.current_rssi();
        lock(&self.script).push(ScriptedAdvertisement {
            after,
            advertisement: Advertisement {
                name: name.map(str::to_owned),
                rssi,
                peripheral,
            },
        });
    }

    /// Set the answer to permission requests.
    pub fn set_permission(&self, status: PermissionStatus) {
        *lock(&self.permission) = status;
    }

    /// Make the next discovery fail with `error`.
    pub fn fail_discovery(&self, error: BluetoothError) {
        *lock(&self.discover_error) = Some(error);
    }

    /// Number of discoveries started.
    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// Number of permission requests.
    #[must_use]
    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn request_permissions(&self) -> PermissionStatus {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        *lock(&self.permission)
    }

    async fn discover(&self) -> BluetoothResult<BoxStream<'static, Advertisement>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.discover_error).take() {
            return Err(error);
        }

        let script = lock(&self.script).clone();
        // A real scan never ends on its own; neither does this one.
        let scripted = stream::iter(script).then(|item| async move {
            tokio::time::sleep(item.after).await;
            item.advertisement
        });
        Ok(scripted.chain(stream::pending()).boxed())
    }
}

/// In-memory [`Peripheral`].
pub struct MockPeripheral {
    id: String,
    connected: AtomicBool,
    rssi: Mutex<VecDeque<BluetoothResult<i16>>>,
    last_rssi: Mutex<Option<i16>>,
    read_delay: Mutex<Duration>,
    connect_failures: AtomicUsize,
    fail_service_discovery: AtomicBool,
    write_failures: AtomicUsize,
    fail_disconnect: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    rssi_reads: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
}

impl MockPeripheral {
    /// A disconnected peripheral with the given identifier.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            connected: AtomicBool::new(false),
            rssi: Mutex::new(VecDeque::new()),
            last_rssi: Mutex::new(Some(-45)),
            read_delay: Mutex::new(Duration::ZERO),
            connect_failures: AtomicUsize::new(0),
            fail_service_discovery: AtomicBool::new(false),
            write_failures: AtomicUsize::new(0),
            fail_disconnect: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            rssi_reads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Queue RSSI samples returned by successive reads. Once drained, the
    /// last sample keeps being returned.
    pub fn push_rssi(&self, samples: impl IntoIterator<Item = i16>) {
        lock(&self.rssi).extend(samples.into_iter().map(Ok));
    }

    /// Queue a failing RSSI read.
    pub fn push_rssi_error(&self) {
        lock(&self.rssi).push_back(Err(BluetoothError::ReadFailed {
            reason: "mock read failure".into(),
        }));
    }

    /// Delay every RSSI read by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        *lock(&self.read_delay) = delay;
    }

    /// Force the link state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every service discovery.
    pub fn fail_service_discovery(&self, fail: bool) {
        self.fail_service_discovery.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    /// Make disconnect return an error (after dropping the link).
    pub fn fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Connect attempts so far.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Disconnect calls so far.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// RSSI reads so far.
    #[must_use]
    pub fn rssi_reads(&self) -> usize {
        self.rssi_reads.load(Ordering::SeqCst)
    }

    /// Payloads successfully written, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    fn current_rssi(&self) -> Option<i16> {
        *lock(&self.last_rssi)
    }

    fn take_decrement(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn is_connected(&self) -> BluetoothResult<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn connect(&self) -> BluetoothResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_decrement(&self.connect_failures) {
            return Err(BluetoothError::ConnectionFailed {
                reason: "mock connect failure".into(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn discover_services(&self, _address: CharacteristicAddress) -> BluetoothResult<()> {
        if self.fail_service_discovery.load(Ordering::SeqCst) {
            return Err(BluetoothError::ServiceDiscoveryFailed {
                reason: "mock discovery failure".into(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> BluetoothResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(BluetoothError::Internal {
                message: "mock disconnect failure".into(),
            });
        }
        Ok(())
    }

    async fn read_rssi(&self) -> BluetoothResult<i16> {
        self.rssi_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.read_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.rssi).pop_front();
        match next {
            Some(Ok(value)) => {
                *lock(&self.last_rssi) = Some(value);
                Ok(value)
            }
            Some(Err(error)) => Err(error),
            None => self.current_rssi().ok_or_else(|| BluetoothError::ReadFailed {
                reason: "no sample".into(),
            }),
        }
    }

    async fn write(&self, _address: CharacteristicAddress, payload: &[u8]) -> BluetoothResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BluetoothError::NotConnected);
        }
        if Self::take_decrement(&self.write_failures) {
            return Err(BluetoothError::WriteFailed {
                reason: "mock write failure".into(),
            });
        }
        lock(&self.writes).push(payload.to_vec());
        Ok(())
    }
}

/// Poison-tolerant lock for test doubles.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
