//! # guardify-core
//!
//! Core business logic for the Guardify BLE tag tracker.
//!
//! This crate provides:
//! - RSSI to distance bucket classification
//! - Tag discovery, connection and reconnection over Bluetooth Low Energy
//! - Proximity monitoring with edge-triggered "left behind" alerts
//! - Buzzer commands written to the tag
//! - Persistent tracked objects and notification history
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`distance`] - Pure RSSI classifier
//! - [`bluetooth`] - Radio/peripheral traits, BlueZ and mock backends
//! - [`connection`] - Scan, connect, reconnect policy and teardown
//! - [`monitor`] - Periodic RSSI polling and the far-alert state machine
//! - [`command`] - Buzzer command channel with one self-healing reconnect
//! - [`alert`] - Alert sink boundary (vibration, notifications, push)
//! - [`objects`] - Tracked object registry and notification history
//! - [`storage`] - JSON list persistence
//! - [`tracker`] - Session orchestration over all of the above
//! - [`config`] - Layered configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod alert;
pub mod bluetooth;
pub mod command;
pub mod config;
pub mod connection;
pub mod distance;
pub mod error;
pub mod monitor;
pub mod objects;
pub mod storage;
pub mod tracker;
pub mod types;

// Re-export primary types for convenience
pub use alert::{AlertEvent, AlertSink, LocalAlertSink, ALERT_TITLE};
#[cfg(feature = "bluetooth")]
pub use bluetooth::bluez::BluezRadio;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use bluetooth::mock::{MockPeripheral, MockRadio};
pub use bluetooth::{
    Advertisement, BluetoothError, BluetoothResult, CharacteristicAddress, ConnectionState,
    PermissionStatus, Peripheral, PeripheralHandle, Radio,
};
pub use command::{BuzzerCommand, CommandChannel, CommandError, CommandResult};
pub use config::{
    AlertsConfig, BluetoothConfig, ConfigError, ConfigResult, Environment, GuardifyConfig,
    LoggingConfig, MonitorConfig, ServerConfig, StorageConfig,
};
pub use connection::ConnectionManager;
pub use distance::{classify, DistanceInfo, DistanceLevel};
pub use error::{Error, GuardifyError, Result};
pub use monitor::{AlertTracker, AlertTransition, MonitorPhase, ProximityMonitor, ProximitySnapshot};
pub use objects::{
    NotificationLog, NotificationRecord, ObjectCategory, ObjectError, ObjectRegistry,
    TrackedObject, MAX_NAME_LENGTH,
};
pub use storage::{default_data_dir, Storage, StorageError};
pub use tracker::Tracker;
pub use types::{DiscoveredPeripheral, HealthResponse, TrackingStatus};
