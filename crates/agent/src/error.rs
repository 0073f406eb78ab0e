use crate::thread::StoreError;

/// Failures surfaced by the turn executor, interruption controller and
/// streaming adapter.
///
/// Tool-level failures never appear here: they are folded into the
/// conversation as error-flagged tool results.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("thread '{thread_id}' cannot be resumed: {reason}")]
    InvalidResumeState { thread_id: String, reason: String },

    #[error("feedback incomplete, no verdict for: {}", pending.join(", "))]
    IncompleteFeedback { pending: Vec<String> },

    #[error("decision does not match any pending tool call: {0}")]
    UnknownToolCall(String),

    #[error("thread '{thread_id}' is waiting for approval of a pending tool call")]
    ApprovalPending { thread_id: String },

    #[error("unknown thread: {0}")]
    UnknownThread(String),

    #[error("upstream execution failed: {0}")]
    Upstream(String),

    #[error("stream did not complete within {secs}s")]
    StreamTimeout { secs: u64 },

    #[error("turn exceeded {0} reasoning iterations")]
    MaxIterations(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TurnError {
    /// Stable name used in error events and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::InvalidResumeState { .. } => "InvalidResumeState",
            TurnError::IncompleteFeedback { .. } => "IncompleteFeedback",
            TurnError::UnknownToolCall(_) => "UnknownToolCall",
            TurnError::ApprovalPending { .. } => "ApprovalPending",
            TurnError::UnknownThread(_) => "UnknownThread",
            TurnError::Upstream(_) => "UpstreamExecutionFailure",
            TurnError::StreamTimeout { .. } => "StreamTimeout",
            TurnError::MaxIterations(_) => "MaxIterations",
            TurnError::Store(_) => "StoreFailure",
        }
    }

    pub(crate) fn invalid_resume(thread_id: &str, reason: impl Into<String>) -> Self {
        TurnError::InvalidResumeState {
            thread_id: thread_id.to_string(),
            reason: reason.into(),
        }
    }
}
