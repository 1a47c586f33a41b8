//! BlueZ backend built on `bluer`.
//!
//! Linux only. Runtime permissions are a D-Bus policy concern on BlueZ, so
//! [`BluezRadio::request_permissions`] reports `NotRequired`; a powered-off
//! adapter is reported as [`BluetoothError::AdapterPoweredOff`] instead.
//!
//! BlueZ only populates `Device1.RSSI` from advertising reports seen during
//! discovery, and clears it when discovery stops. A connected tag therefore
//! keeps an LE discovery session open (duplicate reports enabled) for as
//! long as it is connected, and RSSI is taken from the property change
//! events that session produces. Tags that stop advertising once connected
//! report no RSSI at all; see `DESIGN.md`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session,
};
use futures::stream::{BoxStream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Advertisement, BluetoothError, BluetoothResult, CharacteristicAddress, PermissionStatus,
    Peripheral, Radio,
};

/// How long to wait for BlueZ to resolve GATT services after connecting.
const SERVICES_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);
const SERVICES_RESOLVE_POLL: Duration = Duration::from_millis(200);

/// An RSSI sample older than this is not reported.
const RSSI_MAX_AGE: Duration = Duration::from_secs(10);

/// LE-only discovery that reports every advertisement, not just new devices.
fn le_discovery_filter() -> DiscoveryFilter {
    DiscoveryFilter {
        transport: DiscoveryTransport::Le,
        duplicate_data: true,
        ..DiscoveryFilter::default()
    }
}

/// A BlueZ adapter.
#[derive(Clone)]
pub struct BluezRadio {
    adapter: Adapter,
}

impl BluezRadio {
    /// Open a BlueZ session and select `adapter_name` (or the default adapter).
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::AdapterNotFound`] when no adapter is present
    /// and [`BluetoothError::Internal`] when the D-Bus session fails.
    pub async fn new(adapter_name: Option<&str>) -> BluetoothResult<Self> {
        let session = Session::new().await.map_err(internal)?;
        let adapter = match adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| {
            warn!(error = %e, "Bluetooth adapter lookup failed");
            BluetoothError::AdapterNotFound
        })?;

        info!(adapter = adapter.name(), "Bluetooth adapter selected");
        Ok(Self { adapter })
    }
}

#[async_trait]
impl Radio for BluezRadio {
    async fn request_permissions(&self) -> PermissionStatus {
        PermissionStatus::NotRequired
    }

    async fn discover(&self) -> BluetoothResult<BoxStream<'static, Advertisement>> {
        if !self.adapter.is_powered().await.map_err(internal)? {
            return Err(BluetoothError::AdapterPoweredOff);
        }

        self.adapter
            .set_discovery_filter(le_discovery_filter())
            .await
            .map_err(|e| BluetoothError::DiscoveryFailed {
                reason: e.to_string(),
            })?;

        // `DeviceAdded` is re-emitted whenever a known device's properties
        // change, so a name that arrives after the first report still matches.
        let events = self
            .adapter
            .discover_devices_with_changes()
            .await
            .map_err(|e| BluetoothError::DiscoveryFailed {
                reason: e.to_string(),
            })?;

        let adapter = self.adapter.clone();
        let advertisements = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let AdapterEvent::DeviceAdded(addr) = event else {
                    return None;
                };
                let device = adapter.device(addr).ok()?;
                let name = device.name().await.ok().flatten();
                let rssi = device.rssi().await.ok().flatten();
                debug!(address = %addr, ?name, ?rssi, "Advertisement");
                Some(Advertisement {
                    name,
                    rssi,
                    peripheral: Arc::new(BluezPeripheral::new(adapter, device)),
                })
            }
        });

        Ok(advertisements.boxed())
    }
}

/// Most recent RSSI report for one device.
#[derive(Debug, Default)]
struct RssiCache {
    latest: Mutex<Option<(i16, Instant)>>,
}

impl RssiCache {
    fn record(&self, rssi: i16) {
        *lock(&self.latest) = Some((rssi, Instant::now()));
    }

    /// The last sample, if it is younger than `max_age`.
    fn fresh(&self, max_age: Duration) -> Option<i16> {
        let latest = *lock(&self.latest);
        latest
            .filter(|(_, at)| at.elapsed() <= max_age)
            .map(|(rssi, _)| rssi)
    }

    fn clear(&self) {
        lock(&self.latest).take();
    }
}

/// A BlueZ device.
pub struct BluezPeripheral {
    adapter: Adapter,
    device: Device,
    command: Mutex<Option<(CharacteristicAddress, Characteristic)>>,
    rssi: Arc<RssiCache>,
    rssi_watch: Mutex<Option<CancellationToken>>,
}

impl BluezPeripheral {
    fn new(adapter: Adapter, device: Device) -> Self {
        Self {
            adapter,
            device,
            command: Mutex::new(None),
            rssi: Arc::new(RssiCache::default()),
            rssi_watch: Mutex::new(None),
        }
    }

    /// Keep discovery running and record RSSI reports until disconnect.
    /// Replaces any previous watch.
    async fn start_rssi_watch(&self) -> bluer::Result<()> {
        self.stop_rssi_watch();

        self.adapter
            .set_discovery_filter(le_discovery_filter())
            .await?;
        let mut discovery = self.adapter.discover_devices_with_changes().await?.boxed();
        let mut events = self.device.events().await?.boxed();

        let token = CancellationToken::new();
        *lock(&self.rssi_watch) = Some(token.clone());
        let cache = Arc::clone(&self.rssi);
        let address = self.device.address();

        tokio::spawn(async move {
            debug!(%address, "RSSI watch started");
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    event = events.next() => match event {
                        Some(DeviceEvent::PropertyChanged(DeviceProperty::Rssi(rssi))) => {
                            cache.record(rssi);
                        }
                        Some(_) => {}
                        None => break,
                    },
                    // Drained only to keep the discovery session alive.
                    Some(_) = discovery.next() => {}
                }
            }
            debug!(%address, "RSSI watch ended");
        });
        Ok(())
    }

    fn stop_rssi_watch(&self) {
        if let Some(token) = lock(&self.rssi_watch).take() {
            token.cancel();
        }
        self.rssi.clear();
    }

    async fn wait_services_resolved(&self) -> BluetoothResult<()> {
        let deadline = tokio::time::Instant::now() + SERVICES_RESOLVE_TIMEOUT;
        loop {
            if self
                .device
                .is_services_resolved()
                .await
                .map_err(service_discovery)?
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BluetoothError::ServiceDiscoveryFailed {
                    reason: "services not resolved in time".into(),
                });
            }
            tokio::time::sleep(SERVICES_RESOLVE_POLL).await;
        }
    }

    async fn find_characteristic(
        &self,
        address: CharacteristicAddress,
    ) -> BluetoothResult<Characteristic> {
        for service in self.device.services().await.map_err(service_discovery)? {
            if service.uuid().await.map_err(service_discovery)? != address.service {
                continue;
            }
            for characteristic in service.characteristics().await.map_err(service_discovery)? {
                if characteristic.uuid().await.map_err(service_discovery)?
                    == address.characteristic
                {
                    return Ok(characteristic);
                }
            }
        }
        Err(BluetoothError::CharacteristicNotFound {
            service: address.service,
            characteristic: address.characteristic,
        })
    }

    fn cached(&self, address: CharacteristicAddress) -> Option<Characteristic> {
        lock(&self.command)
            .as_ref()
            .filter(|(cached, _)| *cached == address)
            .map(|(_, characteristic)| characteristic.clone())
    }

    fn store(&self, entry: Option<(CharacteristicAddress, Characteristic)>) {
        *lock(&self.command) = entry;
    }
}

#[async_trait]
impl Peripheral for BluezPeripheral {
    fn id(&self) -> String {
        self.device.address().to_string()
    }

    async fn is_connected(&self) -> BluetoothResult<bool> {
        self.device.is_connected().await.map_err(internal)
    }

    async fn connect(&self) -> BluetoothResult<()> {
        self.device
            .connect()
            .await
            .map_err(|e| BluetoothError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        if let Err(e) = self.start_rssi_watch().await {
            warn!(error = %e, "Could not keep discovery running, RSSI may be unavailable");
        }
        Ok(())
    }

    async fn discover_services(&self, address: CharacteristicAddress) -> BluetoothResult<()> {
        self.wait_services_resolved().await?;
        let characteristic = self.find_characteristic(address).await?;
        self.store(Some((address, characteristic)));
        Ok(())
    }

    async fn disconnect(&self) -> BluetoothResult<()> {
        self.store(None);
        self.stop_rssi_watch();
        self.device.disconnect().await.map_err(internal)
    }

    async fn read_rssi(&self) -> BluetoothResult<i16> {
        if let Some(rssi) = self.rssi.fresh(RSSI_MAX_AGE) {
            return Ok(rssi);
        }
        self.device
            .rssi()
            .await
            .map_err(|e| BluetoothError::ReadFailed {
                reason: e.to_string(),
            })?
            .ok_or_else(|| BluetoothError::ReadFailed {
                reason: "RSSI not reported".into(),
            })
    }

    async fn write(&self, address: CharacteristicAddress, payload: &[u8]) -> BluetoothResult<()> {
        let characteristic = match self.cached(address) {
            Some(characteristic) => characteristic,
            None => {
                let characteristic = self.find_characteristic(address).await?;
                self.store(Some((address, characteristic.clone())));
                characteristic
            }
        };

        characteristic
            .write(payload)
            .await
            .map_err(|e| BluetoothError::WriteFailed {
                reason: e.to_string(),
            })
    }
}

impl Drop for BluezPeripheral {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.rssi_watch).take() {
            token.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn internal(err: bluer::Error) -> BluetoothError {
    BluetoothError::Internal {
        message: err.to_string(),
    }
}

fn service_discovery(err: bluer::Error) -> BluetoothError {
    BluetoothError::ServiceDiscoveryFailed {
        reason: err.to_string(),
    }
}
