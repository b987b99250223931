//! health check endpoint handler

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tidescale_db::Repository;
use tokio::time::timeout;
use tracing::warn;

use crate::AppState;

/// health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// content-type for health check responses per rfc 8040
const HEALTH_CONTENT_TYPE: &str = "application/health+json; charset=utf-8";

const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// `GET /health`
///
/// 200 with `{"status": "pass"}` when the repository answers a ping within
/// a second, 500 with `{"status": "fail"}` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let (status_code, health_status) = match timeout(PING_TIMEOUT, state.db.ping()).await {
        Ok(Ok(())) => (StatusCode::OK, "pass"),
        Ok(Err(e)) => {
            warn!(error = %e, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "fail")
        }
        Err(_) => {
            warn!("health check timed out");
            (StatusCode::INTERNAL_SERVER_ERROR, "fail")
        }
    };

    (
        status_code,
        [(header::CONTENT_TYPE, HEALTH_CONTENT_TYPE)],
        Json(HealthResponse {
            status: health_status,
        }),
    )
        .into_response()
}
