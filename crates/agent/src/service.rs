//! The operations exposed at the system boundary.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use showroom_core::RunMetadata;

use crate::error::TurnError;
use crate::executor::{TurnExecutor, TurnRequest, TurnResult};
use crate::interruption::{ApprovalRequest, InterruptionController, ToolDecision};
use crate::streaming::{AgentEventStream, StreamingAdapter, DEFAULT_STREAM_TIMEOUT};
use crate::thread::{ThreadState, ThreadSummary, TurnOutput};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeOutcome {
    Completed { output: TurnOutput },
    ApprovalPending { approval: ApprovalRequest },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Health {
    Ready { store: String, provider: String },
    NotReady { reason: String },
}

#[derive(Clone)]
pub struct AgentService {
    executor: Arc<TurnExecutor>,
    controller: InterruptionController,
    agent_name: String,
    stream_timeout: Duration,
}

impl AgentService {
    pub fn new(executor: TurnExecutor, controller: InterruptionController) -> Self {
        Self {
            executor: Arc::new(executor),
            controller,
            agent_name: "agent".to_string(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn executor(&self) -> &Arc<TurnExecutor> {
        &self.executor
    }

    pub async fn invoke(
        &self,
        thread_id: &str,
        message: &str,
        metadata: RunMetadata,
    ) -> Result<InvokeOutcome, TurnError> {
        info!(thread_id, agent = %self.agent_name, "invoke");
        let request = TurnRequest::new(thread_id, message).with_metadata(metadata);
        let result = self.executor.run(request).await?;
        self.settle(thread_id, result).await
    }

    pub fn invoke_stream(&self, thread_id: &str, message: &str, metadata: RunMetadata) -> AgentEventStream {
        info!(thread_id, agent = %self.agent_name, "invoke (streaming)");
        StreamingAdapter::new(self.executor.clone())
            .with_agent_name(self.agent_name.clone())
            .with_timeout(self.stream_timeout)
            .stream(TurnRequest::new(thread_id, message).with_metadata(metadata))
    }

    /// Resume the suspended turn of `thread_id` with approver decisions.
    ///
    /// With auto-approval enabled an empty decision list approves everything.
    pub async fn submit_feedback(
        &self,
        thread_id: &str,
        decisions: &[ToolDecision],
    ) -> Result<InvokeOutcome, TurnError> {
        let pending = self
            .executor
            .thread(thread_id)
            .await?
            .and_then(|state| state.pending)
            .ok_or_else(|| TurnError::invalid_resume(thread_id, "no suspended turn"))?;

        let feedback = if decisions.is_empty() && self.controller.auto_approve_enabled() {
            self.controller.approve_all(&pending)
        } else {
            self.controller.apply_decision(&pending, decisions)?
        };
        info!(thread_id, count = decisions.len(), "feedback submitted");
        let result = self.executor.resume(thread_id, feedback).await?;
        self.settle(thread_id, result).await
    }

    pub async fn pending_approval(&self, thread_id: &str) -> Result<Option<ApprovalRequest>, TurnError> {
        let state = self
            .executor
            .thread(thread_id)
            .await?
            .ok_or_else(|| TurnError::UnknownThread(thread_id.to_string()))?;
        Ok(state
            .pending
            .as_ref()
            .map(|meta| self.controller.to_approval_request(meta)))
    }

    pub async fn thread(&self, thread_id: &str) -> Result<ThreadState, TurnError> {
        self.executor
            .thread(thread_id)
            .await?
            .ok_or_else(|| TurnError::UnknownThread(thread_id.to_string()))
    }

    pub async fn threads(&self) -> Result<Vec<ThreadSummary>, TurnError> {
        self.executor.threads().await
    }

    pub async fn health(&self) -> Health {
        let store = self.executor.store();
        match store.health_check().await {
            Ok(()) => Health::Ready {
                store: store.store_name().to_string(),
                provider: self.executor.provider_name().to_string(),
            },
            Err(e) => Health::NotReady {
                reason: e.to_string(),
            },
        }
    }

    /// Map a turn result to an outcome, auto-approving when configured.
    async fn settle(&self, thread_id: &str, mut result: TurnResult) -> Result<InvokeOutcome, TurnError> {
        if self.controller.auto_approve_enabled() {
            // Each resume consumes at least one reasoning iteration, so the
            // executor's iteration cap bounds this loop.
            while let TurnResult::Suspended(meta) = result {
                warn!(thread_id, "auto-approval enabled; resuming without an approver");
                let approved = self.controller.approve_all(&meta);
                result = self.executor.resume(thread_id, approved).await?;
            }
        }
        Ok(match result {
            TurnResult::Completed(output) => InvokeOutcome::Completed { output },
            TurnResult::Suspended(meta) => InvokeOutcome::ApprovalPending {
                approval: self.controller.to_approval_request(&meta),
            },
        })
    }
}
