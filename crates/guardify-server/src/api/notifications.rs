//! Notification history API endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use guardify_core::NotificationRecord;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the notifications router.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/notifications",
        get(list_notifications).delete(clear_notifications),
    )
}

/// List past alerts, newest first.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    operation_id = "listNotifications",
    summary = "List alert history",
    description = "Every time a tracked object was left behind, a notification \
        was recorded. Newest first.",
    responses(
        (status = 200, description = "Notification history", body = Vec<NotificationRecord>)
    )
)]
pub async fn list_notifications(State(state): State<SharedState>) -> Json<Vec<NotificationRecord>> {
    Json(state.tracker.list_notifications())
}

/// Clear the alert history.
#[utoipa::path(
    delete,
    path = "/api/notifications",
    tag = "notifications",
    operation_id = "clearNotifications",
    summary = "Clear alert history",
    responses(
        (status = 204, description = "History cleared"),
        (status = 500, description = "History could not be removed", body = ErrorResponse)
    )
)]
pub async fn clear_notifications(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    state.tracker.clear_notifications()?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::state::test_support::test_state;

    async fn list(app: axum::Router) -> serde_json::Value {
        let response = app
            .oneshot(
                Request::get("/api/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_alert_is_listed_then_cleared() {
        let ts = test_state();
        let app = create_router(ts.state.clone());
        assert_eq!(list(app.clone()).await, serde_json::json!([]));

        ts.tag.push_rssi([-92]);
        ts.state.tracker.locate(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let history = list(app.clone()).await;
        assert_eq!(history[0]["message"], "You forgot \"Guardify\"!");

        let response = app
            .clone()
            .oneshot(
                Request::delete("/api/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(list(app).await, serde_json::json!([]));

        ts.state.tracker.stop().await;
    }
}
