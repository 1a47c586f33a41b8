//! OpenAPI specification generation for the guardify API.
//!
//! The generated document is served at `/api/openapi.json` and written to
//! `openapi.json` by the `gen-openapi` binary for client generation.

use axum::Json;
use guardify_core::{
    AlertEvent, BuzzerCommand, ConnectionState, DiscoveredPeripheral, DistanceInfo,
    DistanceLevel, HealthResponse, MonitorPhase, NotificationRecord, ObjectCategory,
    ProximitySnapshot, TrackedObject, TrackingStatus,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::objects::CreateObjectRequest;
use super::tracking::{BuzzerRequest, BuzzerResponse, LocateRequest};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for guardify.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "guardify API",
        version = "0.1.0",
        description = r#"
# guardify API

guardify keeps track of the things you carry by pairing them with a small
Bluetooth tag.

## Overview

1. **Objects**: discover the tag, then register the object it is attached to
2. **Tracking**: connect to the tag and watch its signal strength; when it
   drops into the medium/far range an alert fires once
3. **Buzzer**: make the tag beep to find it
4. **Notifications**: history of every "left behind" alert

## Distance buckets

| RSSI (dBm) | Level | Shown as |
|---|---|---|
| above -50 | close | < 1m |
| -70 to -50 | near | 1-3m |
| -85 to -70 | medium | 3-5m |
| -85 and below | far | > 5m |
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local guardify server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "tracking", description = "Tracking sessions, buzzer and alert events"),
        (name = "objects", description = "Tag discovery and tracked objects"),
        (name = "notifications", description = "Alert history")
    ),
    paths(
        super::health::health_check,
        super::tracking::locate,
        super::tracking::get_status,
        super::tracking::stop,
        super::tracking::buzzer,
        super::tracking::alert_events,
        super::objects::discover,
        super::objects::list_objects,
        super::objects::create_object,
        super::objects::get_object,
        super::objects::delete_object,
        super::notifications::list_notifications,
        super::notifications::clear_notifications,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            LocateRequest,
            BuzzerRequest,
            BuzzerResponse,
            BuzzerCommand,
            TrackingStatus,
            ConnectionState,
            ProximitySnapshot,
            MonitorPhase,
            DistanceInfo,
            DistanceLevel,
            AlertEvent,
            DiscoveredPeripheral,
            CreateObjectRequest,
            TrackedObject,
            ObjectCategory,
            NotificationRecord,
        )
    )
)]
pub struct ApiDoc;
