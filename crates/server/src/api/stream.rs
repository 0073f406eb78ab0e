//! Server-sent event stream of one turn.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};

use crate::state::AppState;

use super::{require_service, ApiError, InvokeRequest, QueryErrorResponse};

/// Stream a turn as SSE
///
/// Each event is named after its type (`message`, `tool_calls`,
/// `tool_result`, `approval_required`, `end`, `invoke_result`, `error`) and
/// carries the JSON-encoded event as data. Failures after the stream opened
/// arrive as a single `error` event.
#[utoipa::path(
    post,
    path = "/threads/{id}/stream",
    tag = "Agent",
    params(("id" = String, Path, description = "Thread id")),
    request_body = InvokeRequest,
    responses(
        (status = 200, description = "SSE stream of agent events", body = String, content_type = "text/event-stream"),
        (status = 503, description = "Agent not configured", body = QueryErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let service = require_service(&state)?;
    let (message, metadata) = req.into_parts();
    let events = service.invoke_stream(&thread_id, &message, metadata);

    let sse_stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.event_name()).data(data))
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
