use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use common::utils::metrics;

use crate::api_state::ApiState;

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Prometheus text exposition of all registered metrics.
pub async fn prometheus_metrics() -> impl IntoResponse {
    match metrics::encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
