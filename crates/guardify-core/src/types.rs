//! Shared types and OpenAPI schemas.
//!
//! This module contains types that are shared across the application.
//! Most API types are defined in their respective modules (distance, monitor,
//! objects, command).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bluetooth::ConnectionState;
use crate::distance::DistanceInfo;
use crate::monitor::ProximitySnapshot;
use crate::objects::TrackedObject;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,
}

/// A tag found by a discovery scan (add-object flow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DiscoveredPeripheral {
    /// Platform identifier (a MAC address on Linux).
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub id: String,

    /// Advertised name.
    #[schema(example = "Guardify")]
    pub name: Option<String>,

    /// RSSI carried by the advertisement, if any.
    #[schema(example = -58)]
    pub rssi: Option<i16>,

    /// Classification of `rssi`.
    pub distance: Option<DistanceInfo>,
}

/// Everything a tracking screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TrackingStatus {
    /// Radio lifecycle.
    pub connection: ConnectionState,

    /// Identifier of the connected tag.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub peripheral_id: Option<String>,

    /// The object being tracked, if the session was started for one.
    pub object: Option<TrackedObject>,

    /// Latest proximity reading and alert state.
    pub proximity: ProximitySnapshot,

    /// Why the last session attempt failed, if it did.
    #[schema(example = "No 'Guardify' tag found within 15 seconds. Ensure the tag is powered on and within range.")]
    pub last_error: Option<String>,
}
