//! Application state shared across handlers.

use std::sync::Arc;

use guardify_core::{GuardifyConfig, Radio, Tracker};

#[cfg(all(not(feature = "bluetooth"), not(feature = "mock-bluetooth")))]
compile_error!("guardify-server needs the `bluetooth` or `mock-bluetooth` feature");

/// State handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: GuardifyConfig,
    /// The single tracker owning the radio.
    pub tracker: Tracker,
}

impl AppState {
    /// State over an explicit radio.
    #[must_use]
    pub fn new(config: GuardifyConfig, radio: Arc<dyn Radio>) -> Self {
        let tracker = Tracker::from_config(radio, &config);
        Self { config, tracker }
    }

    /// State over the radio selected by the enabled features.
    ///
    /// # Errors
    ///
    /// Returns an error if the Bluetooth adapter cannot be opened.
    pub async fn from_config(config: GuardifyConfig) -> anyhow::Result<Self> {
        let radio = open_radio(&config).await?;
        Ok(Self::new(config, radio))
    }
}

#[cfg(feature = "bluetooth")]
async fn open_radio(config: &GuardifyConfig) -> anyhow::Result<Arc<dyn Radio>> {
    let radio = guardify_core::BluezRadio::new(config.bluetooth.adapter.as_deref()).await?;
    tracing::info!(adapter = ?config.bluetooth.adapter, "Using BlueZ radio");
    Ok(Arc::new(radio))
}

#[cfg(all(not(feature = "bluetooth"), feature = "mock-bluetooth"))]
#[allow(clippy::unused_async)]
async fn open_radio(config: &GuardifyConfig) -> anyhow::Result<Arc<dyn Radio>> {
    use std::time::Duration;

    use guardify_core::{MockPeripheral, MockRadio};

    tracing::warn!("Built without BlueZ support, using a simulated tag");
    let radio = MockRadio::new();
    radio.advertise(
        Duration::from_secs(1),
        Some(&config.bluetooth.peripheral_name),
        Arc::new(MockPeripheral::new("00:00:00:00:00:01")),
    );
    Ok(Arc::new(radio))
}
