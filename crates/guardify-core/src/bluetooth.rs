//! Bluetooth Low Energy abstraction for the Guardify tag.
//!
//! This module provides:
//! - The [`Radio`] and [`Peripheral`] traits the rest of the crate is written
//!   against (discovery, connect, RSSI read, characteristic write)
//! - [`PeripheralHandle`], the connected tag plus its command address
//! - [`BluetoothError`], the failure modes of the radio layer
//!
//! Two backends implement the traits:
//! - [`bluez`] - BlueZ via `bluer` (feature `bluetooth`, Linux)
//! - [`mock`] - scripted in-memory radio (feature `mock-bluetooth`, and tests)

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[cfg(feature = "bluetooth")]
pub mod bluez;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub mod mock;

/// Errors raised by the Bluetooth layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BluetoothError {
    /// No adapter is available on this host.
    #[error("No Bluetooth adapter found")]
    AdapterNotFound,

    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The platform refused the Bluetooth/location permissions.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// No matching peripheral advertised within the scan window.
    #[error("No '{name}' peripheral found within {duration_secs} seconds")]
    ScanTimeout {
        /// Advertised name that was searched for.
        name: String,
        /// Scan window.
        duration_secs: u64,
    },

    /// The scan was cancelled before a match arrived.
    #[error("Scan cancelled")]
    ScanCancelled,

    /// Starting discovery failed.
    #[error("Discovery failed: {reason}")]
    DiscoveryFailed {
        /// Underlying reason.
        reason: String,
    },

    /// Connecting to the peripheral failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Underlying reason.
        reason: String,
    },

    /// Service/characteristic discovery failed after connecting.
    #[error("Service discovery failed: {reason}")]
    ServiceDiscoveryFailed {
        /// Underlying reason.
        reason: String,
    },

    /// The command characteristic is missing from the peripheral's services.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound {
        /// Service searched.
        service: Uuid,
        /// Characteristic searched.
        characteristic: Uuid,
    },

    /// Reading the signal strength failed.
    #[error("RSSI read failed: {reason}")]
    ReadFailed {
        /// Underlying reason.
        reason: String,
    },

    /// Writing to a characteristic failed.
    #[error("Characteristic write failed: {reason}")]
    WriteFailed {
        /// Underlying reason.
        reason: String,
    },

    /// The peripheral is not connected.
    #[error("Peripheral is not connected")]
    NotConnected,

    /// Any other backend failure.
    #[error("Bluetooth error: {message}")]
    Internal {
        /// Backend message.
        message: String,
    },
}

/// Result type for Bluetooth operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// Outcome of a platform permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    /// Permissions granted.
    Granted,
    /// Permissions refused by the user or policy.
    Denied,
    /// The platform does not gate BLE behind runtime permissions.
    NotRequired,
}

impl PermissionStatus {
    /// Whether scanning may proceed.
    #[must_use]
    pub const fn allows_scan(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Lifecycle of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing in flight.
    Idle,
    /// Listening for advertisements.
    Scanning,
    /// Connecting and discovering services.
    Connecting,
    /// Link established, command characteristic resolved.
    Connected,
    /// The link dropped or was torn down.
    Disconnected,
    /// The last scan or connect attempt failed.
    Error,
}

/// Command address on the peripheral: service plus characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicAddress {
    /// GATT service UUID.
    pub service: Uuid,
    /// GATT characteristic UUID within `service`.
    pub characteristic: Uuid,
}

/// A BLE host radio able to discover peripherals.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Ask the platform for scan/connect permissions.
    async fn request_permissions(&self) -> PermissionStatus;

    /// Start discovery. Dropping the stream stops the scan.
    async fn discover(&self) -> BluetoothResult<BoxStream<'static, Advertisement>>;
}

/// A remote BLE peripheral.
#[async_trait]
pub trait Peripheral: Send + Sync {
    /// Stable platform identifier (address on BlueZ).
    fn id(&self) -> String;

    /// Whether the link is currently up.
    async fn is_connected(&self) -> BluetoothResult<bool>;

    /// Establish the link.
    async fn connect(&self) -> BluetoothResult<()>;

    /// Resolve services and verify `address` exists.
    async fn discover_services(&self, address: CharacteristicAddress) -> BluetoothResult<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> BluetoothResult<()>;

    /// Current received signal strength in dBm.
    async fn read_rssi(&self) -> BluetoothResult<i16>;

    /// Write `payload` to the characteristic at `address`, with response.
    async fn write(&self, address: CharacteristicAddress, payload: &[u8]) -> BluetoothResult<()>;
}

/// One advertisement seen during discovery.
#[derive(Clone)]
pub struct Advertisement {
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// RSSI of the advertisement, if reported.
    pub rssi: Option<i16>,
    /// The advertising peripheral.
    pub peripheral: Arc<dyn Peripheral>,
}

impl Advertisement {
    /// Whether the advertised name is exactly `name`.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

impl fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advertisement")
            .field("name", &self.name)
            .field("rssi", &self.rssi)
            .field("peripheral", &self.peripheral.id())
            .finish()
    }
}

/// A connected peripheral and the address commands are written to.
///
/// Owned by the connection manager; cloned by reference into the monitor and
/// command channel for the duration of a session.
#[derive(Clone)]
pub struct PeripheralHandle {
    peripheral: Arc<dyn Peripheral>,
    address: CharacteristicAddress,
}

impl PeripheralHandle {
    /// Wrap a peripheral with its command address.
    #[must_use]
    pub fn new(peripheral: Arc<dyn Peripheral>, address: CharacteristicAddress) -> Self {
        Self {
            peripheral,
            address,
        }
    }

    /// Platform identifier of the peripheral.
    #[must_use]
    pub fn id(&self) -> String {
        self.peripheral.id()
    }

    /// The command address.
    #[must_use]
    pub const fn address(&self) -> CharacteristicAddress {
        self.address
    }

    /// The underlying peripheral.
    #[must_use]
    pub fn peripheral(&self) -> &Arc<dyn Peripheral> {
        &self.peripheral
    }

    /// Live connection check. A failing query counts as disconnected.
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Current RSSI.
    pub async fn read_rssi(&self) -> BluetoothResult<i16> {
        self.peripheral.read_rssi().await
    }

    /// Write `payload` to the command characteristic.
    pub async fn write(&self, payload: &[u8]) -> BluetoothResult<()> {
        self.peripheral.write(self.address, payload).await
    }
}

impl fmt::Debug for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralHandle")
            .field("id", &self.peripheral.id())
            .field("address", &self.address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_status_gates_scan() {
        assert!(PermissionStatus::Granted.allows_scan());
        assert!(PermissionStatus::NotRequired.allows_scan());
        assert!(!PermissionStatus::Denied.allows_scan());
    }

    #[test]
    fn test_advertisement_name_match_is_exact() {
        let peripheral = Arc::new(mock::MockPeripheral::new("AA:BB:CC:DD:EE:FF"));
        let mut adv = Advertisement {
            name: Some("Guardify".into()),
            rssi: Some(-60),
            peripheral,
        };
        assert!(adv.matches_name("Guardify"));
        assert!(!adv.matches_name("guardify"));

        adv.name = Some("Guardify Pro".into());
        assert!(!adv.matches_name("Guardify"));

        adv.name = None;
        assert!(!adv.matches_name("Guardify"));
    }

    #[test]
    fn test_scan_timeout_message() {
        let err = BluetoothError::ScanTimeout {
            name: "Guardify".into(),
            duration_secs: 15,
        };
        assert_eq!(
            err.to_string(),
            "No 'Guardify' peripheral found within 15 seconds"
        );
    }

    #[test]
    fn test_connection_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
    }
}
