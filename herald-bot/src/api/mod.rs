//! API Module
//!
//! Liveness and status endpoints served next to the engine.

pub mod health;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tower_http::trace::TraceLayer;

use crate::service::Correlator;

/// State shared with the handlers
#[derive(Clone)]
pub struct AppState {
    pub namespace: String,
    pub correlator: Arc<Correlator>,
    pub connected: Arc<AtomicBool>,
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/status", get(health::status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
