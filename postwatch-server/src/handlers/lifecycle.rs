use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use postwatch_core::{RegistryHealth, TeardownReport};
use tracing::{error, info};

use crate::infra::app_state::AppState;
use crate::infra::shutdown::ShutdownReason;

/// Stop every channel, answer, then let the server wind down.
///
/// `500` when any channel could not be stopped; the report lists which.
pub async fn stop_channels(
    State(state): State<AppState>,
) -> (StatusCode, Json<TeardownReport>) {
    let report = state.lifecycle.stop_all().await;

    let status = if report.all_stopped() {
        info!(stopped = report.stopped.len(), "all listener channels stopped");
        StatusCode::OK
    } else {
        error!(
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "failed to stop some listener channels"
        );
        StatusCode::INTERNAL_SERVER_ERROR
    };

    state
        .shutdown
        .trigger(ShutdownReason::Teardown(report.clone()));
    (status, Json(report))
}

pub async fn health(State(state): State<AppState>) -> Json<RegistryHealth> {
    Json(state.registry().health(Utc::now()))
}
