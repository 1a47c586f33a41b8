//! Tracked object API endpoints.
//!
//! Adding an object is a two-step flow: `POST /objects/discover` scans for the
//! tag, then `POST /objects` registers one object against that discovery.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use guardify_core::{DiscoveredPeripheral, ObjectCategory, TrackedObject};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the objects router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/objects", get(list_objects).post(create_object))
        .route("/objects/discover", post(discover))
        .route("/objects/{id}", get(get_object).delete(delete_object))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a tracked object.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "name": "House keys", "type": "keys" }))]
pub struct CreateObjectRequest {
    /// Display name, 1 to 64 characters after trimming.
    #[schema(example = "House keys", min_length = 1, max_length = 64)]
    pub name: String,

    /// Category; unknown or missing categories become `other`.
    #[serde(rename = "type", default = "default_category")]
    pub category: ObjectCategory,
}

const fn default_category() -> ObjectCategory {
    ObjectCategory::Other
}

// ============================================================================
// Handlers
// ============================================================================

/// Scan for the tag before adding an object.
#[utoipa::path(
    post,
    path = "/api/objects/discover",
    tag = "objects",
    operation_id = "discoverTag",
    summary = "Discover the tag",
    description = "Scans for the Guardify tag without connecting. A successful \
        discovery allows exactly one object to be added.",
    responses(
        (status = 200, description = "Tag found", body = DiscoveredPeripheral),
        (status = 403, description = "Bluetooth permission denied", body = ErrorResponse),
        (status = 404, description = "No tag found before the scan timed out", body = ErrorResponse)
    )
)]
pub async fn discover(State(state): State<SharedState>) -> ApiResult<Json<DiscoveredPeripheral>> {
    Ok(Json(state.tracker.discover().await?))
}

/// List tracked objects.
#[utoipa::path(
    get,
    path = "/api/objects",
    tag = "objects",
    operation_id = "listObjects",
    summary = "List tracked objects",
    responses(
        (status = 200, description = "Objects in creation order", body = Vec<TrackedObject>)
    )
)]
pub async fn list_objects(State(state): State<SharedState>) -> Json<Vec<TrackedObject>> {
    Json(state.tracker.list_objects())
}

/// Register a tracked object.
#[utoipa::path(
    post,
    path = "/api/objects",
    tag = "objects",
    operation_id = "createObject",
    summary = "Add a tracked object",
    description = "Registers an object for the tag found by the last discovery. \
        Requires a discovery first.",
    request_body = CreateObjectRequest,
    responses(
        (status = 201, description = "Object created", body = TrackedObject),
        (status = 400, description = "Invalid name", body = ErrorResponse),
        (status = 409, description = "No tag discovered yet", body = ErrorResponse)
    )
)]
pub async fn create_object(
    State(state): State<SharedState>,
    Json(request): Json<CreateObjectRequest>,
) -> ApiResult<(StatusCode, Json<TrackedObject>)> {
    let object = state.tracker.add_object(&request.name, request.category)?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// Get one tracked object.
#[utoipa::path(
    get,
    path = "/api/objects/{id}",
    tag = "objects",
    operation_id = "getObject",
    summary = "Get a tracked object",
    params(("id" = String, Path, description = "Object identifier")),
    responses(
        (status = 200, description = "The object", body = TrackedObject),
        (status = 404, description = "Unknown object", body = ErrorResponse)
    )
)]
pub async fn get_object(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackedObject>> {
    Ok(Json(state.tracker.get_object(&id)?))
}

/// Delete a tracked object.
#[utoipa::path(
    delete,
    path = "/api/objects/{id}",
    tag = "objects",
    operation_id = "deleteObject",
    summary = "Delete a tracked object",
    description = "Removes the object. If it is being tracked, the session is \
        stopped and the tag disconnected first.",
    params(("id" = String, Path, description = "Object identifier")),
    responses(
        (status = 200, description = "The removed object", body = TrackedObject),
        (status = 404, description = "Unknown object", body = ErrorResponse)
    )
)]
pub async fn delete_object(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackedObject>> {
    Ok(Json(state.tracker.delete_object(&id).await?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::state::test_support::test_state;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_discovery() {
        let ts = test_state();
        let response = create_router(ts.state)
            .oneshot(post_json("/api/objects", r#"{"name":"Keys","type":"keys"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json(response).await["error"], "peripheral_not_discovered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_create_get_delete() {
        let ts = test_state();
        let app = create_router(ts.state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/objects/discover", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["id"], "AA:BB:CC:DD:EE:FF");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/objects",
                r#"{"name":" Wallet ","type":"wallet"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        assert_eq!(created["name"], "Wallet");
        assert_eq!(created["icon"], "👛");
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/objects/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/objects/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/objects").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(response).await, serde_json::json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_category_becomes_other() {
        let ts = test_state();
        ts.state.tracker.discover().await.unwrap();

        let response = create_router(ts.state)
            .oneshot(post_json(
                "/api/objects",
                r#"{"name":"Umbrella","type":"umbrella"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        assert_eq!(created["type"], "other");
        assert_eq!(created["icon"], "📦");
    }

    #[tokio::test]
    async fn test_get_missing_object_is_404() {
        let ts = test_state();
        let response = create_router(ts.state)
            .oneshot(
                Request::get("/api/objects/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
