//! HTTP endpoint modules.
//!
//! Shared error body, status mapping and the "agent configured" guard live
//! here; each sub-module owns one area of the surface.

mod chat;
pub mod doc;
mod feedback;
mod health;
mod stream;
mod threads;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use showroom_agent::{AgentService, TurnError};
use showroom_core::metadata::USER_ID_KEY;
use showroom_core::RunMetadata;

use crate::state::AppState;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryErrorResponse {
    pub error: String,
    pub error_type: String,
}

pub type ApiError = (StatusCode, Json<QueryErrorResponse>);

/// Body of the invoke and stream endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InvokeRequest {
    pub message: String,
    /// Shorthand for `metadata.user_id`.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: RunMetadata,
}

impl InvokeRequest {
    pub(crate) fn into_parts(self) -> (String, RunMetadata) {
        let mut metadata = self.metadata;
        if let Some(user_id) = self.user_id {
            metadata.insert(USER_ID_KEY, serde_json::Value::String(user_id));
        }
        (self.message, metadata)
    }
}

// ── Guards & error mapping ───────────────────────────────────────

/// Return 503 when no LLM provider is configured.
pub(crate) fn require_service(state: &AppState) -> Result<&AgentService, ApiError> {
    state.service.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(QueryErrorResponse {
                error: "Agent not configured. Set LLM_PROVIDER and LLM_API_KEY.".into(),
                error_type: "NotConfigured".into(),
            }),
        )
    })
}

pub(crate) fn status_for(err: &TurnError) -> StatusCode {
    match err {
        TurnError::InvalidResumeState { .. } | TurnError::ApprovalPending { .. } => {
            StatusCode::CONFLICT
        }
        TurnError::IncompleteFeedback { .. } | TurnError::UnknownToolCall(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TurnError::UnknownThread(_) => StatusCode::NOT_FOUND,
        TurnError::Upstream(_)
        | TurnError::StreamTimeout { .. }
        | TurnError::MaxIterations(_)
        | TurnError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn turn_error(err: TurnError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, kind = err.kind(), "agent request failed");
    } else {
        tracing::warn!(error = %err, kind = err.kind(), "agent request rejected");
    }
    (
        status,
        Json(QueryErrorResponse {
            error: err.to_string(),
            error_type: err.kind().to_string(),
        }),
    )
}

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths for route registration.

pub use chat::{hitl_chat, invoke};
pub use feedback::{approval, feedback};
pub use health::{config, health};
pub use stream::stream;
pub use threads::{thread_get, threads_list};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                TurnError::InvalidResumeState {
                    thread_id: "42".into(),
                    reason: "no suspended turn".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                TurnError::ApprovalPending { thread_id: "42".into() },
                StatusCode::CONFLICT,
            ),
            (
                TurnError::IncompleteFeedback { pending: vec!["placeOrderTool".into()] },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (TurnError::UnknownToolCall("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (TurnError::UnknownThread("9".into()), StatusCode::NOT_FOUND),
            (TurnError::MaxIterations(10), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_user_id_shorthand_merges_into_metadata() {
        let req: InvokeRequest = serde_json::from_value(serde_json::json!({
            "message": "我的账户",
            "user_id": "42",
            "metadata": {"channel": "web"}
        }))
        .unwrap();
        let (message, metadata) = req.into_parts();
        assert_eq!(message, "我的账户");
        assert_eq!(metadata.user_id().as_deref(), Some("42"));
        assert_eq!(metadata.get("channel"), Some(&serde_json::json!("web")));
    }
}
