//! Thread history inspection.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use showroom_agent::{ThreadState, ThreadSummary};

use crate::state::AppState;

use super::{require_service, turn_error, ApiError, QueryErrorResponse};

/// List threads, most recently updated first
#[utoipa::path(
    get,
    path = "/threads",
    tag = "Threads",
    responses(
        (status = 200, description = "Thread summaries", body = Object),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn threads_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let service = require_service(&state)?;
    service.threads().await.map(Json).map_err(turn_error)
}

/// Full state of one thread
#[utoipa::path(
    get,
    path = "/threads/{id}",
    tag = "Threads",
    params(("id" = String, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Conversation, turns and pending interruption", body = Object),
        (status = 404, description = "Unknown thread", body = QueryErrorResponse),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn thread_get(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadState>, ApiError> {
    let service = require_service(&state)?;
    service.thread(&thread_id).await.map(Json).map_err(turn_error)
}
