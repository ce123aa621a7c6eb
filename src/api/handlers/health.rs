use crate::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

fn label(ok: bool) -> &'static str {
    if ok { "connected" } else { "disconnected" }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and blob store reachable", body = HealthResponse),
        (status = 503, description = "A backing service is unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: database ping failed: {}", e);
            false
        }
    };

    // Existence of the health-check key does not matter, only that the store answered.
    let storage = match state.storage.file_exists("health-check").await {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check: storage check failed: {:#}", e);
            false
        }
    };

    let healthy = database && storage;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            database: label(database).to_string(),
            storage: label(storage).to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
