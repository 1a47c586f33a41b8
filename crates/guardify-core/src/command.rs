//! Buzzer command channel.
//!
//! Commands are short ASCII payloads written to the tag's command
//! characteristic. Delivery is best effort with a single self-healing step:
//! a missing or dropped link is reconnected once before writing, and a failed
//! write triggers one reconnect before the error is reported. Nothing loops.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::bluetooth::{BluetoothError, PeripheralHandle};
use crate::connection::ConnectionManager;

/// Errors raised when sending a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The command text is not a known command.
    #[error("Unknown buzzer command '{command}'. Expected ON or OFF.")]
    UnknownCommand {
        /// The rejected text.
        command: String,
    },

    /// The peripheral could not be (re)connected before writing.
    #[error("Could not reach the tag: {source}")]
    ReconnectFailed {
        /// Why reconnecting failed.
        #[source]
        source: BluetoothError,
    },

    /// The write itself failed.
    #[error("Command write failed: {reason}")]
    WriteFailed {
        /// Underlying error message.
        reason: String,
    },
}

/// Result type for command operations.
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// A buzzer command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuzzerCommand {
    /// Start buzzing.
    On,
    /// Stop buzzing.
    Off,
}

impl BuzzerCommand {
    /// Wire payload.
    #[must_use]
    pub const fn payload(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Command text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for BuzzerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuzzerCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            c if c.eq_ignore_ascii_case("on") => Ok(Self::On),
            c if c.eq_ignore_ascii_case("off") => Ok(Self::Off),
            other => Err(CommandError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }
}

/// Writes buzzer commands, reconnecting through the [`ConnectionManager`].
pub struct CommandChannel {
    connections: Arc<ConnectionManager>,
}

impl CommandChannel {
    /// Channel using `connections` for any reconnect.
    #[must_use]
    pub const fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Send `command` to the tag.
    ///
    /// With no handle, runs one scan-and-connect cycle first. With a
    /// disconnected handle, runs one reconnect first. Returns the handle the
    /// command went to, which may be newly connected.
    ///
    /// # Errors
    ///
    /// - [`CommandError::ReconnectFailed`] if the pre-send reconnect failed
    /// - [`CommandError::WriteFailed`] if the write failed; one healing
    ///   reconnect has been attempted, the write is not retried
    pub async fn send(
        &self,
        handle: Option<&PeripheralHandle>,
        command: BuzzerCommand,
    ) -> CommandResult<PeripheralHandle> {
        let handle = self.ensure_connected(handle).await?;

        match handle.write(command.payload()).await {
            Ok(()) => {
                info!(%command, id = %handle.id(), "Buzzer command sent");
                Ok(handle)
            }
            Err(e) => {
                warn!(%command, error = %e, "Buzzer command failed, reconnecting");
                if let Err(heal) = self.connections.reconnect(&handle).await {
                    debug!(error = %heal, "Healing reconnect failed");
                }
                Err(CommandError::WriteFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn ensure_connected(
        &self,
        handle: Option<&PeripheralHandle>,
    ) -> CommandResult<PeripheralHandle> {
        let reconnect_failed = |source| CommandError::ReconnectFailed { source };

        match handle {
            Some(handle) if handle.is_connected().await => Ok(handle.clone()),
            Some(handle) => {
                info!(id = %handle.id(), "Tag disconnected, reconnecting before command");
                self.connections
                    .reconnect(handle)
                    .await
                    .map_err(reconnect_failed)?;
                Ok(handle.clone())
            }
            None => {
                info!("No tag connected, scanning before command");
                let advertisement = self
                    .connections
                    .start_scan()
                    .await
                    .map_err(reconnect_failed)?;
                self.connections
                    .connect(advertisement.peripheral)
                    .await
                    .map_err(reconnect_failed)
            }
        }
    }
}
