//! Blocking invocation endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use showroom_agent::InvokeOutcome;
use showroom_core::RunMetadata;

use crate::state::AppState;

use super::{require_service, turn_error, ApiError, InvokeRequest, QueryErrorResponse};

/// Run one turn on a thread
///
/// Returns the final output, or the approval request when a protected tool
/// call suspended the turn.
#[utoipa::path(
    post,
    path = "/threads/{id}/invoke",
    tag = "Agent",
    params(("id" = String, Path, description = "Thread id")),
    request_body = InvokeRequest,
    responses(
        (status = 200, description = "Turn completed or awaiting approval", body = Object),
        (status = 409, description = "Thread is waiting for approval", body = QueryErrorResponse),
        (status = 500, description = "Upstream or store failure", body = QueryErrorResponse),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn invoke(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeOutcome>, ApiError> {
    let service = require_service(&state)?;
    let (message, metadata) = req.into_parts();
    service
        .invoke(&thread_id, &message, metadata)
        .await
        .map(Json)
        .map_err(turn_error)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HitlChatQuery {
    pub question: String,
    /// Used as both the thread id and the run's `user_id`.
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Ask the showroom agent a question as a given user
#[utoipa::path(
    get,
    path = "/hitl/chat",
    tag = "Agent",
    params(HitlChatQuery),
    responses(
        (status = 200, description = "Turn completed or awaiting approval", body = Object),
        (status = 409, description = "Thread is waiting for approval", body = QueryErrorResponse),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn hitl_chat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HitlChatQuery>,
) -> Result<Json<InvokeOutcome>, ApiError> {
    let service = require_service(&state)?;
    service
        .invoke(&query.user_id, &query.question, RunMetadata::for_user(query.user_id.clone()))
        .await
        .map(Json)
        .map_err(turn_error)
}
