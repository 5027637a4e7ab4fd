//! Health Check API Handlers

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub namespace: String,
    pub tracked_notifications: usize,
    pub watch_connected: bool,
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
/// Watch and notification counters
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        namespace: state.namespace.clone(),
        tracked_notifications: state.correlator.tracked_count(),
        watch_connected: state.connected.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use crate::api::{AppState, create_router};
    use crate::testing::{FakeMessages, correlator};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState {
            namespace: "jx".to_string(),
            correlator: correlator(Arc::new(FakeMessages::default())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = create_router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_status_reports_watch_state() {
        let response = create_router(state())
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["namespace"], "jx");
        assert_eq!(json["tracked_notifications"], 0);
        assert_eq!(json["watch_connected"], true);
    }
}
