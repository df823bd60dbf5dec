use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::infra::app_state::AppState;

/// Create the API router: notifications, teardown and health.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/api", post(handlers::receive_notification))
        .route("/api/stop", post(handlers::stop_channels))
        .route("/api/health", get(handlers::health))
}

pub fn create_app(state: AppState) -> Router {
    create_api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
