//! Tracking API endpoints.
//!
//! One tracking session at a time: `locate` scans for the tag, connects and
//! starts proximity monitoring; `stop` releases everything. Alert effects
//! (vibration, push) are streamed to clients as server-sent events.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use guardify_core::{AlertEvent, BuzzerCommand, TrackingStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the tracking router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/tracking/locate", post(locate))
        .route("/tracking/status", get(get_status))
        .route("/tracking/stop", post(stop))
        .route("/tracking/buzzer", post(buzzer))
        .route("/tracking/events", get(alert_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a tracking session.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({ "object_id": "01936f4e-7c2a-7d4b-9a3e-5f1c2b3d4e5f" }))]
pub struct LocateRequest {
    /// Object to track. Omit to track the tag without an object label.
    #[schema(example = "01936f4e-7c2a-7d4b-9a3e-5f1c2b3d4e5f")]
    pub object_id: Option<String>,
}

/// Request body for a buzzer command.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "command": "ON" }))]
pub struct BuzzerRequest {
    /// `ON` or `OFF`.
    #[schema(example = "ON")]
    pub command: String,
}

/// Response after a buzzer command was written.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({ "command": "ON", "sent": true }))]
pub struct BuzzerResponse {
    /// The command written.
    pub command: BuzzerCommand,

    /// Always true; failures are reported as errors.
    #[schema(example = true)]
    pub sent: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start tracking the tag.
#[utoipa::path(
    post,
    path = "/api/tracking/locate",
    tag = "tracking",
    operation_id = "locate",
    summary = "Start a tracking session",
    description = "Tears down any previous session, scans for the Guardify tag, \
        connects to it and starts polling its signal strength. Blocks until the \
        tag is connected or the scan times out.",
    request_body(content = LocateRequest, description = "Optional object to label the session with"),
    responses(
        (status = 200, description = "Tracking started", body = TrackingStatus),
        (status = 403, description = "Bluetooth permission denied", body = super::error::ErrorResponse),
        (status = 404, description = "Object or tag not found", body = super::error::ErrorResponse),
        (status = 409, description = "Superseded by a newer request", body = super::error::ErrorResponse),
        (status = 502, description = "Connecting to the tag failed", body = super::error::ErrorResponse)
    )
)]
pub async fn locate(
    State(state): State<SharedState>,
    body: Option<Json<LocateRequest>>,
) -> ApiResult<Json<TrackingStatus>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let status = state.tracker.locate(request.object_id.as_deref()).await?;
    Ok(Json(status))
}

/// Current tracking status.
#[utoipa::path(
    get,
    path = "/api/tracking/status",
    tag = "tracking",
    operation_id = "getTrackingStatus",
    summary = "Get tracking status",
    description = "Returns the connection state, the latest distance reading, \
        whether the object is considered left behind, and the tracked object.",
    responses(
        (status = 200, description = "Current status", body = TrackingStatus)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<TrackingStatus> {
    Json(state.tracker.status())
}

/// Stop tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/stop",
    tag = "tracking",
    operation_id = "stopTracking",
    summary = "Stop the tracking session",
    description = "Stops polling, cancels any scan and disconnects the tag. \
        Safe to call at any time.",
    responses(
        (status = 200, description = "Tracking stopped", body = TrackingStatus)
    )
)]
pub async fn stop(State(state): State<SharedState>) -> Json<TrackingStatus> {
    state.tracker.stop().await;
    Json(state.tracker.status())
}

/// Send a buzzer command.
#[utoipa::path(
    post,
    path = "/api/tracking/buzzer",
    tag = "tracking",
    operation_id = "buzzer",
    summary = "Turn the tag's buzzer on or off",
    description = "Writes ON or OFF to the tag. Reconnects once first when the \
        tag is not connected. A failed write triggers one reconnect and is \
        reported; it is not retried.",
    request_body = BuzzerRequest,
    responses(
        (status = 200, description = "Command written", body = BuzzerResponse),
        (status = 400, description = "Unknown command", body = super::error::ErrorResponse),
        (status = 502, description = "Write failed", body = super::error::ErrorResponse)
    )
)]
pub async fn buzzer(
    State(state): State<SharedState>,
    Json(request): Json<BuzzerRequest>,
) -> ApiResult<Json<BuzzerResponse>> {
    let command: BuzzerCommand = request.command.parse()?;
    state.tracker.buzz(command).await?;
    Ok(Json(BuzzerResponse {
        command,
        sent: true,
    }))
}

/// Stream alert events.
#[utoipa::path(
    get,
    path = "/api/tracking/events",
    tag = "tracking",
    operation_id = "alertEvents",
    summary = "Stream alert events",
    description = "Server-sent events. Each `vibrate` or `push` event carries \
        an AlertEvent JSON payload and is emitted when the tracked object \
        moves out of range.",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = AlertEvent)
    )
)]
pub async fn alert_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.tracker.subscribe();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(alert) => {
                    let name = match &alert {
                        AlertEvent::Vibrate { .. } => "vibrate",
                        AlertEvent::Push { .. } => "push",
                    };
                    match Event::default().event(name).json_data(&alert) {
                        Ok(event) => return Some((Ok(event), receiver)),
                        Err(e) => warn!(error = %e, "Failed to encode alert event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Alert stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
