//! Conversation threads and the stores that hold them.
//!
//! A [`ThreadState`] is a plain serde record: the message history, every turn
//! taken on the thread, and the pending interruption if the last turn is
//! suspended. Stores persist the record as a unit so the snapshot and the
//! pending interruption can never be observed half-written.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use showroom_core::RunMetadata;
use showroom_tool_runtime::{Conversation, ConversationMessage, ToolResult};

use crate::interruption::InterruptionMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    InProgress,
    Completed,
    Suspended,
    Failed,
}

/// One logical request/response exchange on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub metadata: RunMetadata,
    pub status: TurnStatus,
    /// Reasoning iterations consumed so far, across suspensions.
    #[serde(default)]
    pub iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn start(input: impl Into<String>, metadata: RunMetadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            metadata,
            status: TurnStatus::InProgress,
            iterations: 0,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Final answer of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    pub thread_id: String,
    pub turn_id: String,
    pub text: String,
    /// Tool results folded in during this turn, in execution order.
    pub tool_results: Vec<ToolResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: String,
    pub conversation: Conversation,
    pub turns: Vec<Turn>,
    /// Present iff the last turn is suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<InterruptionMetadata>,
    /// Free-form variables carried across turns.
    #[serde(default)]
    pub scratch: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            conversation: Conversation::new(),
            turns: Vec::new(),
            pending: None,
            scratch: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_turn_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Build the output of the last turn from the messages after its user input.
    pub fn last_output(&self) -> Option<TurnOutput> {
        let turn = self.last_turn()?;
        let messages = self.conversation.messages();
        let start = messages
            .iter()
            .rposition(|m| matches!(m, ConversationMessage::User(_)))
            .map_or(0, |pos| pos + 1);

        let mut text = None;
        let mut tool_results = Vec::new();
        for message in &messages[start..] {
            match message {
                // Only the final assistant message answers the turn.
                ConversationMessage::Assistant(content) => text = content.text.clone(),
                ConversationMessage::ToolResult(result) => tool_results.push(result.clone()),
                ConversationMessage::User(_) => {}
            }
        }

        Some(TurnOutput {
            thread_id: self.thread_id.clone(),
            turn_id: turn.id.clone(),
            text: turn.output.clone().or(text).unwrap_or_default(),
            tool_results,
        })
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary::from(self)
    }
}

/// Lightweight thread summary (no messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<TurnStatus>,
    pub awaiting_approval: bool,
}

impl From<&ThreadState> for ThreadSummary {
    fn from(state: &ThreadState) -> Self {
        Self {
            thread_id: state.thread_id.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            message_count: state.conversation.len(),
            turn_count: state.turns.len(),
            last_status: state.last_turn().map(|t| t.status),
            awaiting_approval: state.is_suspended(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize thread '{thread_id}': {source}")]
    Serialization {
        thread_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Persistence for thread state. Keyed by thread id; last write wins.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, StoreError>;

    async fn save(&self, state: &ThreadState) -> Result<(), StoreError>;

    /// All threads, most recently updated first.
    async fn list(&self) -> Result<Vec<ThreadSummary>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn store_name(&self) -> &str;
}

/// In-process store. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<String, ThreadState>>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, StoreError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, state: &ThreadState) -> Result<(), StoreError> {
        self.threads
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let map = self.threads.read().await;
        let mut summaries: Vec<ThreadSummary> = map.values().map(ThreadSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showroom_tool_runtime::{AssistantContent, ToolCall};

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryThreadStore::new();
        assert!(store.load("42").await.unwrap().is_none());

        let mut state = ThreadState::new("42");
        state.conversation.add_user_message("hi".into());
        store.save(&state).await.unwrap();

        let loaded = store.load("42").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.list().await.unwrap()[0].message_count, 1);
    }

    #[test]
    fn test_last_output_collects_turn_results() {
        let mut state = ThreadState::new("t");
        state.conversation.add_user_message("old".into());
        state
            .conversation
            .add_tool_result(ToolResult::text("c0", "stale"));
        state.turns.push(Turn::start("new", RunMetadata::new()));
        state.conversation.add_user_message("new".into());
        state.conversation.add_tool_result(ToolResult::text("c1", "fresh"));
        state
            .conversation
            .add_assistant_response(AssistantContent::text("answer"));

        let output = state.last_output().unwrap();
        assert_eq!(output.text, "answer");
        assert_eq!(output.tool_results.len(), 1);
        assert_eq!(output.tool_results[0].content, "fresh");
    }

    #[test]
    fn test_last_output_ignores_earlier_assistant_text() {
        let mut state = ThreadState::new("42");
        state.turns.push(Turn::start("下单", RunMetadata::new()));
        state.conversation.add_user_message("帮我下单奥迪A4L".into());
        state.conversation.add_assistant_response(AssistantContent {
            text: Some("好的".into()),
            tool_calls: vec![ToolCall {
                id: "c1".into(),
                name: "placeOrderTool".into(),
                input: serde_json::json!({"orderInfo": "奥迪A4L"}),
            }],
        });
        state
            .conversation
            .add_tool_result(ToolResult::text("c1", "用户id：42，下单成功"));
        state
            .conversation
            .add_assistant_response(AssistantContent::default());

        let output = state.last_output().unwrap();
        assert_eq!(output.text, "");
        assert_eq!(output.tool_results.len(), 1);
    }
}
