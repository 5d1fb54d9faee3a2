use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use chatgate_types::HealthResponse;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// GET {prefix}/health
pub async fn health() -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
    })
}
