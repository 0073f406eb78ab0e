//! Suspension records and the controller that turns them into approval
//! requests and back into resumable feedback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use showroom_tool_runtime::{ConversationMessage, ToolCall};

use crate::error::TurnError;

/// Node name recorded on interruptions raised for protected tool calls.
pub const APPROVAL_NODE: &str = "human_approval";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackResult {
    Pending,
    Approved,
    Denied,
}

/// Verdict slot for one pending protected tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFeedback {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: Value,
    pub description: String,
    pub result: FeedbackResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolFeedback {
    pub fn pending(call: &ToolCall, description: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.input.clone(),
            description: description.into(),
            result: FeedbackResult::Pending,
            override_arguments: None,
            reason: None,
        }
    }

    /// Arguments the tool should run with once approved.
    pub fn effective_arguments(&self) -> &Value {
        self.override_arguments.as_ref().unwrap_or(&self.arguments)
    }
}

/// Thread state captured at the moment of suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub scratch: Map<String, Value>,
    /// Reasoning iteration the resumed loop continues from.
    pub iteration: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionMetadata {
    pub node: String,
    pub thread_id: String,
    pub turn_id: String,
    pub snapshot: StateSnapshot,
    pub tool_feedbacks: Vec<ToolFeedback>,
}

impl InterruptionMetadata {
    pub fn approval_request(&self) -> ApprovalRequest {
        ApprovalRequest {
            thread_id: self.thread_id.clone(),
            node: self.node.clone(),
            pending_calls: self
                .tool_feedbacks
                .iter()
                .map(|f| PendingCall {
                    tool_call_id: f.tool_call_id.clone(),
                    tool: f.name.clone(),
                    args: f.arguments.clone(),
                    description: f.description.clone(),
                })
                .collect(),
        }
    }

    /// Names of calls that still have no verdict.
    pub fn undecided(&self) -> Vec<String> {
        self.tool_feedbacks
            .iter()
            .filter(|f| f.result == FeedbackResult::Pending)
            .map(|f| f.name.clone())
            .collect()
    }
}

/// What an approver sees for a suspended turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub thread_id: String,
    pub node: String,
    pub pending_calls: Vec<PendingCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    pub tool_call_id: String,
    pub tool: String,
    pub args: Value,
    pub description: String,
}

/// An approver's verdict on one pending call, addressed by call id or, when
/// the id is omitted, by tool name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub verdict: FeedbackResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolDecision {
    pub fn approve(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool: None,
            verdict: FeedbackResult::Approved,
            override_args: None,
            reason: None,
        }
    }

    pub fn approve_tool(tool: impl Into<String>) -> Self {
        Self {
            tool_call_id: None,
            tool: Some(tool.into()),
            verdict: FeedbackResult::Approved,
            override_args: None,
            reason: None,
        }
    }

    pub fn deny(tool_call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool: None,
            verdict: FeedbackResult::Denied,
            override_args: None,
            reason: Some(reason.into()),
        }
    }

    pub fn with_override(mut self, args: Value) -> Self {
        self.override_args = Some(args);
        self
    }

    fn target(&self) -> String {
        self.tool_call_id
            .clone()
            .or_else(|| self.tool.clone())
            .unwrap_or_else(|| "<unaddressed>".to_string())
    }
}

/// Packages suspensions for approvers and folds their decisions back in.
#[derive(Debug, Clone, Default)]
pub struct InterruptionController {
    auto_approve: bool,
}

impl InterruptionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow [`InterruptionController::approve_all`] to be used by the boundary
    /// when a caller supplies no decisions.
    pub fn with_auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = enabled;
        self
    }

    pub fn auto_approve_enabled(&self) -> bool {
        self.auto_approve
    }

    pub fn to_approval_request(&self, metadata: &InterruptionMetadata) -> ApprovalRequest {
        metadata.approval_request()
    }

    /// Apply decisions to every pending call of `metadata`.
    ///
    /// Feedback order follows the pending calls, not the decisions. Every call
    /// must end up with a non-pending verdict.
    pub fn apply_decision(
        &self,
        metadata: &InterruptionMetadata,
        decisions: &[ToolDecision],
    ) -> Result<InterruptionMetadata, TurnError> {
        let mut updated = metadata.clone();
        let mut decided = vec![false; updated.tool_feedbacks.len()];

        for decision in decisions {
            let index = match (&decision.tool_call_id, &decision.tool) {
                (Some(id), _) => updated
                    .tool_feedbacks
                    .iter()
                    .position(|f| &f.tool_call_id == id),
                (None, Some(tool)) => updated
                    .tool_feedbacks
                    .iter()
                    .enumerate()
                    .position(|(i, f)| &f.name == tool && !decided[i]),
                (None, None) => None,
            }
            .ok_or_else(|| TurnError::UnknownToolCall(decision.target()))?;

            if decision.verdict == FeedbackResult::Pending {
                return Err(TurnError::IncompleteFeedback {
                    pending: vec![updated.tool_feedbacks[index].name.clone()],
                });
            }

            let feedback = &mut updated.tool_feedbacks[index];
            feedback.result = decision.verdict;
            feedback.override_arguments = decision.override_args.clone();
            feedback.reason = decision.reason.clone();
            decided[index] = true;
        }

        let undecided = updated.undecided();
        if !undecided.is_empty() {
            return Err(TurnError::IncompleteFeedback { pending: undecided });
        }
        Ok(updated)
    }

    /// Approve every pending call unconditionally.
    pub fn approve_all(&self, metadata: &InterruptionMetadata) -> InterruptionMetadata {
        warn!(
            thread_id = %metadata.thread_id,
            count = metadata.tool_feedbacks.len(),
            "auto-approving protected tool calls"
        );
        let mut updated = metadata.clone();
        for feedback in &mut updated.tool_feedbacks {
            feedback.result = FeedbackResult::Approved;
        }
        updated
    }
}
