//! Readiness and configuration endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use showroom_agent::Health;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Health>,
}

/// Server and agent readiness
///
/// 200 once the thread store answers; 503 while the store is unreachable or
/// no LLM provider is configured.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Agent ready", body = Object),
        (status = 503, description = "Agent not ready or not configured", body = Object)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let agent = state.config.agent.name.clone();
    let version = env!("CARGO_PKG_VERSION");
    let Some(service) = state.service.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_configured",
                version,
                agent,
                detail: None,
            }),
        );
    };
    let detail = service.health().await;
    let (code, status) = match detail {
        Health::Ready { .. } => (StatusCode::OK, "ok"),
        Health::NotReady { .. } => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };
    (
        code,
        Json(HealthResponse {
            status,
            version,
            agent,
            detail: Some(detail),
        }),
    )
}

/// Active configuration with secrets removed
#[utoipa::path(
    get,
    path = "/config",
    tag = "Health",
    responses(
        (status = 200, description = "Redacted configuration", body = Object)
    )
)]
pub async fn config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config.redacted_summary())
}
