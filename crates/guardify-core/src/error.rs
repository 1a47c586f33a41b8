//! Unified error types for the guardify core library.
//!
//! This module provides a unified error type [`GuardifyError`] that covers all
//! failure modes across the system. Each module also has its own specific error
//! types (`BluetoothError`, `CommandError`, `ObjectError`, `StorageError`,
//! `ConfigError`) for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use guardify_core::error::{GuardifyError, Result};
//!
//! fn require_discovery(discovered: bool) -> Result<()> {
//!     if !discovered {
//!         return Err(GuardifyError::PeripheralNotDiscovered);
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all guardify operations.
///
/// Nothing here is fatal to the process: every variant leaves the system
/// ready for a fresh user-initiated retry.
#[derive(Debug, Error)]
pub enum GuardifyError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// The platform refused Bluetooth or location permissions.
    #[error("Bluetooth permission denied. Grant Bluetooth and location access, then retry.")]
    BluetoothPermissionDenied,

    /// No tag advertised within the scan window.
    #[error(
        "No '{name}' tag found within {duration_secs} seconds. Ensure the tag is powered on and within range."
    )]
    PeripheralNotFound {
        /// Advertised name searched for.
        name: String,
        /// Scan window.
        duration_secs: u64,
    },

    /// The scan was cancelled by a newer scan or a teardown.
    #[error("Scan cancelled")]
    ScanCancelled,

    /// Discovery or another radio-level operation failed.
    #[error("Bluetooth error: {0}")]
    BluetoothFailure(String),

    /// Connecting or resolving the command characteristic failed.
    #[error("Could not connect to the tag: {0}")]
    ConnectionFailed(String),

    /// An RSSI read or characteristic write failed.
    #[error("Tag I/O failed: {0}")]
    PeripheralIoFailed(String),

    /// The operation needs a connected tag.
    #[error("Tag is not connected")]
    NotConnected,

    // =========================================================================
    // COMMAND & SESSION ERRORS
    // =========================================================================
    /// The buzzer command text is not recognised.
    #[error("Unknown buzzer command '{0}'. Expected ON or OFF.")]
    UnknownCommand(String),

    /// Sending a buzzer command failed.
    #[error("Buzzer command failed: {0}")]
    CommandFailed(String),

    /// A newer tracking session (or a stop) replaced this one.
    #[error("Tracking session was superseded by a newer request")]
    SessionSuperseded,

    // =========================================================================
    // OBJECT ERRORS
    // =========================================================================
    /// The object name was empty.
    #[error("Object name cannot be empty")]
    EmptyObjectName,

    /// The object name exceeds the maximum allowed length.
    #[error("Object name exceeds maximum length of {max} characters (got {actual})")]
    ObjectNameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length provided.
        actual: usize,
    },

    /// No tracked object has this identifier.
    #[error("Object not found: '{0}'")]
    ObjectNotFound(String),

    /// Objects can only be added right after a discovery scan found the tag.
    #[error("No tag discovered yet. Run a discovery scan before adding an object.")]
    PeripheralNotDiscovered,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for guardify operations.
pub type Result<T> = std::result::Result<T, GuardifyError>;

/// Short alias for [`GuardifyError`].
pub type Error = GuardifyError;

impl GuardifyError {
    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothAdapterPoweredOff
                | Self::BluetoothPermissionDenied
                | Self::PeripheralNotFound { .. }
                | Self::ScanCancelled
                | Self::BluetoothFailure(_)
                | Self::ConnectionFailed(_)
                | Self::PeripheralIoFailed(_)
                | Self::NotConnected
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to tracked objects.
    #[inline]
    #[must_use]
    pub const fn is_object_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyObjectName
                | Self::ObjectNameTooLong { .. }
                | Self::ObjectNotFound(_)
                | Self::PeripheralNotDiscovered
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error represents an expected operational state
    /// rather than a failure (the tag is simply out of range, or the user
    /// moved on to another session).
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(
            self,
            Self::PeripheralNotFound { .. } | Self::ScanCancelled | Self::SessionSuperseded
        )
    }

    /// Returns `true` if retrying the same request may succeed without any
    /// change on the host.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PeripheralNotFound { .. }
                | Self::ScanCancelled
                | Self::ConnectionFailed(_)
                | Self::PeripheralIoFailed(_)
                | Self::NotConnected
                | Self::CommandFailed(_)
                | Self::SessionSuperseded
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::UnknownCommand(_) | Self::EmptyObjectName | Self::ObjectNameTooLong { .. } => 400,

            // 403 Forbidden - understood but refused
            Self::BluetoothPermissionDenied => 403,

            // 404 Not Found
            Self::ObjectNotFound(_) | Self::PeripheralNotFound { .. } | Self::ConfigNotFound(_) => {
                404
            }

            // 409 Conflict - request does not fit the current session state
            Self::PeripheralNotDiscovered
            | Self::SessionSuperseded
            | Self::ScanCancelled
            | Self::NotConnected => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the tag misbehaved
            Self::ConnectionFailed(_) | Self::PeripheralIoFailed(_) | Self::CommandFailed(_) => {
                502
            }

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::BluetoothAdapterNotFound
            | Self::BluetoothAdapterPoweredOff
            | Self::BluetoothFailure(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothPermissionDenied => "BLUETOOTH_PERMISSION_DENIED",
            Self::PeripheralNotFound { .. } => "PERIPHERAL_NOT_FOUND",
            Self::ScanCancelled => "SCAN_CANCELLED",
            Self::BluetoothFailure(_) => "BLUETOOTH_FAILURE",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::PeripheralIoFailed(_) => "PERIPHERAL_IO_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::CommandFailed(_) => "COMMAND_FAILED",
            Self::SessionSuperseded => "SESSION_SUPERSEDED",
            Self::EmptyObjectName => "EMPTY_OBJECT_NAME",
            Self::ObjectNameTooLong { .. } => "OBJECT_NAME_TOO_LONG",
            Self::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            Self::PeripheralNotDiscovered => "PERIPHERAL_NOT_DISCOVERED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::bluetooth::BluetoothError> for GuardifyError {
    fn from(err: crate::bluetooth::BluetoothError) -> Self {
        use crate::bluetooth::BluetoothError;
        match err {
            BluetoothError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            BluetoothError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            BluetoothError::PermissionDenied => Self::BluetoothPermissionDenied,
            BluetoothError::ScanTimeout {
                name,
                duration_secs,
            } => Self::PeripheralNotFound {
                name,
                duration_secs,
            },
            BluetoothError::ScanCancelled => Self::ScanCancelled,
            BluetoothError::DiscoveryFailed { reason } => Self::BluetoothFailure(reason),
            BluetoothError::Internal { message } => Self::BluetoothFailure(message),
            BluetoothError::ConnectionFailed { reason }
            | BluetoothError::ServiceDiscoveryFailed { reason } => Self::ConnectionFailed(reason),
            e @ BluetoothError::CharacteristicNotFound { .. } => {
                Self::ConnectionFailed(e.to_string())
            }
            e @ (BluetoothError::ReadFailed { .. } | BluetoothError::WriteFailed { .. }) => {
                Self::PeripheralIoFailed(e.to_string())
            }
            BluetoothError::NotConnected => Self::NotConnected,
        }
    }
}

impl From<crate::command::CommandError> for GuardifyError {
    fn from(err: crate::command::CommandError) -> Self {
        use crate::command::CommandError;
        match err {
            CommandError::UnknownCommand { command } => Self::UnknownCommand(command),
            CommandError::ReconnectFailed { source } => source.into(),
            CommandError::WriteFailed { reason } => Self::CommandFailed(reason),
        }
    }
}

impl From<crate::storage::StorageError> for GuardifyError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<crate::objects::ObjectError> for GuardifyError {
    fn from(err: crate::objects::ObjectError) -> Self {
        use crate::objects::ObjectError;
        match err {
            ObjectError::EmptyName => Self::EmptyObjectName,
            ObjectError::NameTooLong { max, actual } => Self::ObjectNameTooLong { max, actual },
            ObjectError::NotFound { id } => Self::ObjectNotFound(id),
            ObjectError::PeripheralNotDiscovered => Self::PeripheralNotDiscovered,
            ObjectError::Storage(e) => e.into(),
        }
    }
}

impl From<crate::config::ConfigError> for GuardifyError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::BluetoothError;
    use crate::command::CommandError;
    use crate::config::ConfigError;
    use crate::objects::ObjectError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(GuardifyError::BluetoothAdapterNotFound.is_bluetooth_error());
        assert!(GuardifyError::BluetoothPermissionDenied.is_bluetooth_error());
        assert!(GuardifyError::ConnectionFailed("gatt".into()).is_bluetooth_error());
        assert!(GuardifyError::NotConnected.is_bluetooth_error());

        assert!(!GuardifyError::PeripheralNotDiscovered.is_bluetooth_error());
    }

    #[test]
    fn test_object_and_config_classification() {
        assert!(GuardifyError::EmptyObjectName.is_object_error());
        assert!(GuardifyError::ObjectNotFound("1".into()).is_object_error());
        assert!(GuardifyError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(GuardifyError::ConfigValidationError("bad".into()).is_config_error());

        assert!(!GuardifyError::BluetoothAdapterNotFound.is_config_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(GuardifyError::PersistenceError("disk full".into()).is_io_error());
        assert!(GuardifyError::IoError(IoErr::new(ErrorKind::NotFound, "test")).is_io_error());
        assert!(!GuardifyError::NotConnected.is_io_error());
    }

    #[test]
    fn test_expected_and_recoverable() {
        let timeout = GuardifyError::PeripheralNotFound {
            name: "Guardify".into(),
            duration_secs: 15,
        };
        assert!(timeout.is_expected_state());
        assert!(timeout.is_recoverable());
        assert!(GuardifyError::SessionSuperseded.is_expected_state());
        assert!(GuardifyError::CommandFailed("gatt".into()).is_recoverable());

        assert!(!GuardifyError::BluetoothAdapterNotFound.is_recoverable());
        assert!(!GuardifyError::BluetoothPermissionDenied.is_expected_state());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(GuardifyError::EmptyObjectName.http_status_code(), 400);
        assert_eq!(GuardifyError::UnknownCommand("X".into()).http_status_code(), 400);
        assert_eq!(GuardifyError::BluetoothPermissionDenied.http_status_code(), 403);
        assert_eq!(GuardifyError::ObjectNotFound("1".into()).http_status_code(), 404);
        assert_eq!(GuardifyError::PeripheralNotDiscovered.http_status_code(), 409);
        assert_eq!(GuardifyError::SessionSuperseded.http_status_code(), 409);
        assert_eq!(GuardifyError::ConfigParseError("e".into()).http_status_code(), 422);
        assert_eq!(GuardifyError::PersistenceError("e".into()).http_status_code(), 500);
        assert_eq!(GuardifyError::ConnectionFailed("e".into()).http_status_code(), 502);
        assert_eq!(GuardifyError::BluetoothAdapterNotFound.http_status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GuardifyError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            GuardifyError::PeripheralNotDiscovered.error_code(),
            "PERIPHERAL_NOT_DISCOVERED"
        );
        assert_eq!(
            GuardifyError::SessionSuperseded.error_code(),
            "SESSION_SUPERSEDED"
        );
    }

    #[test]
    fn test_from_bluetooth_error() {
        let err: GuardifyError = BluetoothError::ScanTimeout {
            name: "Guardify".into(),
            duration_secs: 15,
        }
        .into();
        assert!(matches!(
            err,
            GuardifyError::PeripheralNotFound { duration_secs: 15, .. }
        ));

        let err: GuardifyError = BluetoothError::ServiceDiscoveryFailed {
            reason: "timeout".into(),
        }
        .into();
        assert!(matches!(err, GuardifyError::ConnectionFailed(ref r) if r == "timeout"));

        let err: GuardifyError = BluetoothError::ReadFailed {
            reason: "gone".into(),
        }
        .into();
        assert!(matches!(err, GuardifyError::PeripheralIoFailed(_)));
    }

    #[test]
    fn test_from_command_error() {
        let err: GuardifyError = CommandError::ReconnectFailed {
            source: BluetoothError::PermissionDenied,
        }
        .into();
        assert!(matches!(err, GuardifyError::BluetoothPermissionDenied));

        let err: GuardifyError = CommandError::WriteFailed {
            reason: "gatt".into(),
        }
        .into();
        assert_eq!(err.error_code(), "COMMAND_FAILED");
    }

    #[test]
    fn test_from_object_and_config_errors() {
        let err: GuardifyError = ObjectError::NameTooLong { max: 64, actual: 80 }.into();
        assert!(matches!(
            err,
            GuardifyError::ObjectNameTooLong { max: 64, actual: 80 }
        ));

        let err: GuardifyError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "x".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "y".into(),
            },
        ])
        .into();
        assert!(err.to_string().contains("'a': x; Invalid value for 'b': y"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: GuardifyError = io_err.into();
        assert!(matches!(err, GuardifyError::IoError(_)));
        assert!(err.is_io_error());
    }

    #[test]
    fn test_error_display_messages() {
        let err = GuardifyError::BluetoothAdapterNotFound;
        assert!(err.to_string().contains("No Bluetooth adapter found"));

        let err = GuardifyError::ObjectNotFound("abc".into());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GuardifyError>();
        assert_sync::<GuardifyError>();
    }
}
