//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults (every field has one)
//! 2. An optional TOML file (`/etc/guardify/config.toml` on Linux, the
//!    platform config directory elsewhere, or `$GUARDIFY_CONFIG`)
//! 3. Environment overrides: `GUARDIFY__<SECTION>__<KEY>`, e.g.
//!    `GUARDIFY__MONITOR__POLL_INTERVAL_MS=1000`
//!
//! Covers:
//! - Which peripheral to look for and where its command characteristic lives
//! - Scan, reconnect and polling timings
//! - Alert delivery and storage location
//! - HTTP bind address and log output

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::bluetooth::CharacteristicAddress;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "GUARDIFY_CONFIG";

/// Prefix for per-key environment overrides.
const ENV_PREFIX: &str = "GUARDIFY";

/// Advertised name of the tag.
pub const DEFAULT_PERIPHERAL_NAME: &str = "Guardify";

/// GATT service exposing the buzzer characteristic.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_1234_1234_1234_5678_90ab);

/// Characteristic accepting `ON`/`OFF` buzzer commands.
pub const DEFAULT_COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xabcd_efab_1234_5678_1234_abcd_efab_cdef);

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardifyConfig {
    /// Peripheral identification and radio timings.
    pub bluetooth: BluetoothConfig,
    /// Proximity polling and alert pattern.
    pub monitor: MonitorConfig,
    /// Alert delivery.
    pub alerts: AlertsConfig,
    /// Persistence.
    pub storage: StorageConfig,
    /// HTTP server.
    pub server: ServerConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Peripheral identification and radio timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Advertised name to match, exactly.
    pub peripheral_name: String,

    /// GATT service holding the command characteristic.
    pub service_uuid: Uuid,

    /// Characteristic buzzer commands are written to.
    pub command_characteristic_uuid: Uuid,

    /// Adapter to use (e.g. `hci0`); the default adapter when unset.
    pub adapter: Option<String>,

    /// Hard scan timeout. No retry once it elapses.
    pub scan_timeout_secs: u64,

    /// Pause after cancelling a previous scan before starting a new one.
    pub scan_restart_delay_ms: u64,

    /// Pause after dropping a stale connection before reconnecting.
    pub reconnect_settle_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            peripheral_name: DEFAULT_PERIPHERAL_NAME.to_string(),
            service_uuid: DEFAULT_SERVICE_UUID,
            command_characteristic_uuid: DEFAULT_COMMAND_CHARACTERISTIC_UUID,
            adapter: None,
            scan_timeout_secs: 15,
            scan_restart_delay_ms: 1000,
            reconnect_settle_ms: 500,
        }
    }
}

impl BluetoothConfig {
    /// Command characteristic address.
    #[must_use]
    pub const fn command_address(&self) -> CharacteristicAddress {
        CharacteristicAddress {
            service: self.service_uuid,
            characteristic: self.command_characteristic_uuid,
        }
    }

    /// Scan timeout as a [`Duration`].
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Scan restart delay as a [`Duration`].
    #[must_use]
    pub const fn scan_restart_delay(&self) -> Duration {
        Duration::from_millis(self.scan_restart_delay_ms)
    }

    /// Reconnect settle delay as a [`Duration`].
    #[must_use]
    pub const fn reconnect_settle(&self) -> Duration {
        Duration::from_millis(self.reconnect_settle_ms)
    }
}

/// Proximity polling and alert pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// RSSI poll period.
    pub poll_interval_ms: u64,

    /// Vibration pattern played on far-entry, in milliseconds.
    pub alert_vibration_ms: Vec<u64>,

    /// Upper bound on any single alert sink call.
    pub sink_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            alert_vibration_ms: vec![500, 500, 500],
            sink_timeout_ms: 3000,
        }
    }
}

impl MonitorConfig {
    /// Poll period as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Sink timeout as a [`Duration`].
    #[must_use]
    pub const fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}

/// Alert delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Whether push notifications may be delivered. When false, push
    /// requests are silently dropped (the "permission denied" path).
    pub push_enabled: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { push_enabled: true }
    }
}

/// Persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the object and notification lists.
    pub data_dir: Option<PathBuf>,
}

/// HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Where the process runs, which decides the log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Pretty logs on stdout.
    #[default]
    Development,
    /// JSON logs to rolling files plus compact stdout for the journal.
    Production,
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Selects the log format and sinks.
    pub environment: Environment,

    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `guardify_core=debug,info`.
    pub level: String,

    /// Directory for rolling log files in production. Platform default when
    /// unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Whether production logging is selected.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

impl GuardifyConfig {
    /// Load configuration from the default location (or `$GUARDIFY_CONFIG`)
    /// plus environment overrides, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed, if `$GUARDIFY_CONFIG`
    /// points at a missing file, or if validation fails.
    pub fn load() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                Self::load_from(&path)
            }
            None => Self::load_from(&default_config_path()),
        }
    }

    /// Load configuration from `path` (missing file is fine) plus environment
    /// overrides, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("monitor.alert_vibration_ms"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every field, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.bluetooth.peripheral_name.trim().is_empty() {
            invalid("bluetooth.peripheral_name", "must not be empty");
        }
        if !(1..=60).contains(&self.bluetooth.scan_timeout_secs) {
            invalid("bluetooth.scan_timeout_secs", "must be between 1 and 60");
        }
        if self.bluetooth.service_uuid == self.bluetooth.command_characteristic_uuid {
            invalid(
                "bluetooth.command_characteristic_uuid",
                "must differ from bluetooth.service_uuid",
            );
        }
        if self.monitor.poll_interval_ms < 100 {
            invalid("monitor.poll_interval_ms", "must be at least 100");
        }
        if self.monitor.alert_vibration_ms.is_empty() {
            invalid("monitor.alert_vibration_ms", "must not be empty");
        }
        if self.monitor.sink_timeout_ms == 0 {
            invalid("monitor.sink_timeout_ms", "must be greater than 0");
        }
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            invalid("server.bind_address", "must be a socket address");
        }
        if self.logging.level.trim().is_empty() {
            invalid("logging.level", "must not be empty");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Platform default configuration file.
///
/// On Linux: `/etc/guardify/config.toml`.
/// Elsewhere: the platform config directory (e.g. `~/.config/guardify/`).
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/guardify/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "guardify").map_or_else(
            || PathBuf::from("./config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GuardifyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bluetooth.peripheral_name, "Guardify");
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.bluetooth.scan_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_uuids_match_firmware() {
        assert_eq!(
            DEFAULT_SERVICE_UUID.to_string(),
            "12345678-1234-1234-1234-1234567890ab"
        );
        assert_eq!(
            DEFAULT_COMMAND_CHARACTERISTIC_UUID.to_string(),
            "abcdefab-1234-5678-1234-abcdefabcdef"
        );
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = GuardifyConfig::default();
        config.bluetooth.peripheral_name = "  ".into();
        config.bluetooth.scan_timeout_secs = 0;
        config.monitor.poll_interval_ms = 10;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = GuardifyConfig::default();
        config.monitor.alert_vibration_ms.clear();

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "monitor.alert_vibration_ms");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GuardifyConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bluetooth, BluetoothConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[bluetooth]
scan_timeout_secs = 10
adapter = "hci1"

[monitor]
poll_interval_ms = 1000
alert_vibration_ms = [200, 100]

[storage]
data_dir = "/tmp/guardify"
"#,
        )
        .unwrap();

        let config = GuardifyConfig::load_from(&path).unwrap();
        assert_eq!(config.bluetooth.scan_timeout_secs, 10);
        assert_eq!(config.bluetooth.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.bluetooth.peripheral_name, "Guardify");
        assert_eq!(config.monitor.poll_interval_ms, 1000);
        assert_eq!(config.monitor.alert_vibration_ms, vec![200, 100]);
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/guardify")));
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[bluetooth]\nscan_timeout_secs = 600\n").unwrap();

        let err = GuardifyConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_logging_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[logging]\nenvironment = \"production\"\nlevel = \"debug\"\ndirectory = \"/tmp/guardify-logs\"\n",
        )
        .unwrap();

        let config = GuardifyConfig::load_from(&path).unwrap();
        assert!(config.logging.is_production());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/tmp/guardify-logs"))
        );
        assert!(!LoggingConfig::default().is_production());
    }

    #[test]
    fn test_command_address() {
        let config = BluetoothConfig::default();
        let address = config.command_address();
        assert_eq!(address.service, DEFAULT_SERVICE_UUID);
        assert_eq!(address.characteristic, DEFAULT_COMMAND_CHARACTERISTIC_UUID);
    }
}
