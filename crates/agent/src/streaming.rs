//! Turns a runner's node stream into the event stream handed to clients.
//!
//! The source may stop at its `__END__` marker while an announced tool call
//! has no result yet. In that case the adapter forwards the marker, then runs
//! the turn to completion through [`TurnRunner::continue_turn`] and emits the
//! outcome as one extra `__INVOKE_RESULT` event.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use showroom_core::RunMetadata;
use showroom_tool_runtime::{ToolCall, ToolResult};

use crate::error::TurnError;
use crate::executor::{TurnRequest, TurnResult, TurnRunner};
use crate::interruption::ApprovalRequest;
use crate::node::{NodeOutput, NodeStream, END_NODE, MODEL_NODE, TOOL_NODE};
use crate::thread::TurnOutput;

/// Node name of the event synthesized by the continuation fallback.
pub const INVOKE_RESULT_NODE: &str = "__INVOKE_RESULT";

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Message {
        node: String,
        text: String,
    },
    ToolCalls {
        node: String,
        calls: Vec<ToolCall>,
    },
    ToolResult {
        node: String,
        tool: String,
        result: ToolResult,
    },
    ApprovalRequired {
        approval: ApprovalRequest,
    },
    End {
        node: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<TurnOutput>,
    },
    InvokeResult {
        node: String,
        agent: String,
        text: String,
        output: TurnOutput,
    },
    Error {
        error: bool,
        error_type: String,
        error_message: String,
    },
}

impl AgentEvent {
    pub fn error(err: &TurnError) -> Self {
        AgentEvent::Error {
            error: true,
            error_type: err.kind().to_string(),
            error_message: err.to_string(),
        }
    }

    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::Message { .. } => "message",
            AgentEvent::ToolCalls { .. } => "tool_calls",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::ApprovalRequired { .. } => "approval_required",
            AgentEvent::End { .. } => "end",
            AgentEvent::InvokeResult { .. } => "invoke_result",
            AgentEvent::Error { .. } => "error",
        }
    }
}

impl From<NodeOutput> for AgentEvent {
    fn from(output: NodeOutput) -> Self {
        match output {
            NodeOutput::AssistantDelta { text } => AgentEvent::Message {
                node: MODEL_NODE.to_string(),
                text,
            },
            NodeOutput::ToolCalls { calls } => AgentEvent::ToolCalls {
                node: MODEL_NODE.to_string(),
                calls,
            },
            NodeOutput::ToolResult { tool, result } => AgentEvent::ToolResult {
                node: TOOL_NODE.to_string(),
                tool,
                result,
            },
            NodeOutput::Interruption(meta) => AgentEvent::ApprovalRequired {
                approval: meta.approval_request(),
            },
            NodeOutput::End { output } => AgentEvent::End {
                node: END_NODE.to_string(),
                output,
            },
        }
    }
}

pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

pub struct StreamingAdapter<R: TurnRunner> {
    runner: Arc<R>,
    agent_name: String,
    timeout: Duration,
}

impl<R: TurnRunner> StreamingAdapter<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            agent_name: "agent".to_string(),
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stream(&self, request: TurnRequest) -> AgentEventStream {
        self.stream_with_pending(request, false)
    }

    /// Like [`StreamingAdapter::stream`]; `tool_call_pending` tells the
    /// adapter a tool call is already outstanding, so an empty source still
    /// triggers the continuation.
    pub fn stream_with_pending(&self, request: TurnRequest, tool_call_pending: bool) -> AgentEventStream {
        let (tx, rx) = mpsc::channel(64);
        let runner = self.runner.clone();
        let agent = self.agent_name.clone();
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;

        tokio::spawn(async move {
            let thread_id = request.thread_id.clone();
            let metadata = request.metadata.clone();
            let source = runner.stream(request);
            let relay = Relay {
                runner,
                agent,
                thread_id,
                metadata,
                tx: tx.clone(),
            };

            if tokio::time::timeout_at(deadline, relay.run(source, tool_call_pending))
                .await
                .is_err()
            {
                warn!(secs = timeout.as_secs(), "stream timed out");
                let err = TurnError::StreamTimeout {
                    secs: timeout.as_secs(),
                };
                let _ = tx.send(AgentEvent::error(&err)).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Per-subscription state of the spawned forwarding task.
struct Relay<R: TurnRunner> {
    runner: Arc<R>,
    agent: String,
    thread_id: String,
    metadata: RunMetadata,
    tx: mpsc::Sender<AgentEvent>,
}

impl<R: TurnRunner> Relay<R> {
    async fn send(&self, event: AgentEvent) {
        // A gone subscriber only stops delivery; the source keeps draining.
        let _ = self.tx.send(event).await;
    }

    async fn run(self, mut source: NodeStream, tool_call_pending: bool) {
        let mut unresolved: Vec<String> = Vec::new();
        let mut received = false;

        while let Some(item) = source.next().await {
            received = true;
            let output = match item {
                Ok(output) => output,
                Err(e) => {
                    warn!(thread_id = %self.thread_id, error = %e, "stream source failed");
                    self.send(AgentEvent::error(&e)).await;
                    return;
                }
            };

            match &output {
                NodeOutput::ToolCalls { calls } => {
                    unresolved.extend(calls.iter().map(|c| c.id.clone()));
                }
                NodeOutput::ToolResult { result, .. } => {
                    unresolved.retain(|id| id != &result.tool_call_id);
                }
                NodeOutput::AssistantDelta { .. } => {}
                NodeOutput::Interruption(_) => {
                    self.send(output.into()).await;
                    return;
                }
                NodeOutput::End { .. } => {
                    self.send(output.into()).await;
                    if !unresolved.is_empty() {
                        debug!(thread_id = %self.thread_id, ?unresolved, "end marker with unresolved tool calls");
                        self.continuation().await;
                    }
                    return;
                }
            }
            self.send(output.into()).await;
        }

        // Source closed without an end marker.
        if !unresolved.is_empty() || (!received && tool_call_pending) {
            self.continuation().await;
        }
    }

    /// Finish the turn on its own task and emit exactly one event for it.
    async fn continuation(&self) {
        info!(thread_id = %self.thread_id, "running continuation after early end of stream");
        let runner = self.runner.clone();
        let thread_id = self.thread_id.clone();
        let metadata = self.metadata.clone();
        // Spawned so a timed-out or dropped subscription cannot cut it short.
        let handle =
            tokio::spawn(async move { runner.continue_turn(&thread_id, &metadata).await });

        let event = match handle.await {
            Ok(Ok(TurnResult::Completed(output))) => AgentEvent::InvokeResult {
                node: INVOKE_RESULT_NODE.to_string(),
                agent: self.agent.clone(),
                text: output.text.clone(),
                output,
            },
            Ok(Ok(TurnResult::Suspended(meta))) => AgentEvent::ApprovalRequired {
                approval: meta.approval_request(),
            },
            Ok(Err(e)) => AgentEvent::error(&e),
            Err(join_err) => AgentEvent::error(&TurnError::Upstream(join_err.to_string())),
        };
        self.send(event).await;
    }
}
