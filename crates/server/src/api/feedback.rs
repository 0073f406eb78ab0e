//! Approval inspection and feedback submission.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use showroom_agent::{ApprovalRequest, InvokeOutcome, ToolDecision};

use crate::state::AppState;

use super::{require_service, turn_error, ApiError, QueryErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    /// One verdict per pending call, addressed by `tool_call_id` or `tool`.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub decisions: Vec<ToolDecision>,
}

/// Pending approval of a suspended thread
#[utoipa::path(
    get,
    path = "/threads/{id}/approval",
    tag = "Agent",
    params(("id" = String, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Approval request, or null when nothing is pending", body = Object),
        (status = 404, description = "Unknown thread", body = QueryErrorResponse),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn approval(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Option<ApprovalRequest>>, ApiError> {
    let service = require_service(&state)?;
    service
        .pending_approval(&thread_id)
        .await
        .map(Json)
        .map_err(turn_error)
}

/// Resume a suspended turn with approver decisions
#[utoipa::path(
    post,
    path = "/threads/{id}/feedback",
    tag = "Agent",
    params(("id" = String, Path, description = "Thread id")),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Turn completed or suspended again", body = Object),
        (status = 409, description = "Nothing to resume", body = QueryErrorResponse),
        (status = 422, description = "Feedback incomplete or mismatched", body = QueryErrorResponse),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<InvokeOutcome>, ApiError> {
    let service = require_service(&state)?;
    service
        .submit_feedback(&thread_id, &req.decisions)
        .await
        .map(Json)
        .map_err(turn_error)
}
