//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `tracking` - Tracking sessions, buzzer commands and alert events
//! - `objects` - Tag discovery and tracked objects
//! - `notifications` - Alert history
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod notifications;
pub mod objects;
pub mod openapi;
pub mod tracking;

pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /api
/// ├── /tracking
/// │   ├── /locate          - Start a session (scan, connect, poll)
/// │   ├── /status          - Connection and proximity state
/// │   ├── /stop            - Stop the session
/// │   ├── /buzzer          - ON / OFF
/// │   └── /events          - Alert effects as server-sent events
/// ├── /objects             - Tracked objects (+ /discover, /{id})
/// ├── /notifications       - Alert history
/// └── /openapi.json        - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .merge(tracking::router())
                .merge(objects::router())
                .merge(notifications::router()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
