//! The turn executor: reasoning/tool loop with suspension and resume.
//!
//! Flow: user input → model → tool calls → auto tools run, protected tools
//! suspend → approver feedback → resume → model → ... → final text.
//!
//! Every step is persisted through the [`ThreadStore`] as it is folded into
//! state, so a caller that goes away mid-turn never loses finished work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use showroom_core::RunMetadata;
use showroom_tool_runtime::{
    AssistantContent, Conversation, ModelRequest, ResponseAccumulator, StreamEvent, ToolAwareLlmProvider,
    ToolCall, ToolContext, ToolPolicy, ToolRegistry, ToolResult,
};

use crate::error::TurnError;
use crate::interceptor::ModelInterceptor;
use crate::interruption::{
    FeedbackResult, InterruptionMetadata, StateSnapshot, ToolFeedback, APPROVAL_NODE,
};
use crate::node::{NodeOutput, NodeStream};
use crate::thread::{ThreadState, ThreadStore, ThreadSummary, Turn, TurnOutput, TurnStatus};

/// Input of one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub input: String,
    pub metadata: RunMetadata,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            input: input.into(),
            metadata: RunMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    Completed(TurnOutput),
    Suspended(InterruptionMetadata),
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub system_prompt: Option<String>,
    pub max_iterations: usize,
    pub context_window_tokens: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 10,
            context_window_tokens: 8192,
            temperature: 0.5,
            max_tokens: 2000,
        }
    }
}

/// Per-thread-id async mutexes. Distinct threads never contend.
#[derive(Clone, Default)]
pub struct ThreadLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ThreadLocks {
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(thread_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Where node outputs go. Send failures are ignored: a dropped subscriber
/// must not stop the run.
struct Sink(Option<mpsc::Sender<Result<NodeOutput, TurnError>>>);

impl Sink {
    fn none() -> Self {
        Sink(None)
    }

    async fn emit(&self, output: NodeOutput) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(Ok(output)).await;
        }
    }
}

/// Something that can run a turn as an event stream and finish a turn whose
/// stream ended early. Implemented by [`TurnExecutor`]; the streaming adapter
/// depends only on this.
#[async_trait]
pub trait TurnRunner: Send + Sync + 'static {
    fn stream(&self, request: TurnRequest) -> NodeStream;

    async fn continue_turn(
        &self,
        thread_id: &str,
        metadata: &RunMetadata,
    ) -> Result<TurnResult, TurnError>;
}

#[derive(Clone)]
pub struct TurnExecutor {
    provider: Arc<dyn ToolAwareLlmProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ThreadStore>,
    interceptors: Vec<Arc<dyn ModelInterceptor>>,
    locks: ThreadLocks,
    settings: ExecutorSettings,
}

impl TurnExecutor {
    pub fn new(
        provider: Arc<dyn ToolAwareLlmProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ThreadStore>,
    ) -> Self {
        Self {
            provider,
            registry,
            store,
            interceptors: Vec::new(),
            locks: ThreadLocks::default(),
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn ModelInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub async fn thread(&self, thread_id: &str) -> Result<Option<ThreadState>, TurnError> {
        Ok(self.store.load(thread_id).await?)
    }

    pub async fn threads(&self) -> Result<Vec<ThreadSummary>, TurnError> {
        Ok(self.store.list().await?)
    }

    /// Run one turn to completion or to a suspension point.
    pub async fn run(&self, request: TurnRequest) -> Result<TurnResult, TurnError> {
        let _guard = self.locks.acquire(&request.thread_id).await;
        self.run_locked(request, &Sink::none()).await
    }

    /// Resume a suspended turn with decided feedback.
    pub async fn resume(
        &self,
        thread_id: &str,
        feedback: InterruptionMetadata,
    ) -> Result<TurnResult, TurnError> {
        let _guard = self.locks.acquire(thread_id).await;
        self.resume_locked(thread_id, feedback, &Sink::none()).await
    }

    /// Drive the latest turn of a thread to an end without new input.
    pub async fn continue_turn(
        &self,
        thread_id: &str,
        metadata: &RunMetadata,
    ) -> Result<TurnResult, TurnError> {
        let _guard = self.locks.acquire(thread_id).await;
        self.continue_locked(thread_id, metadata, &Sink::none()).await
    }

    /// Run one turn on a spawned task, emitting a [`NodeOutput`] per step.
    ///
    /// Errors arrive as the last item. Dropping the stream does not cancel
    /// the run.
    pub fn run_streaming(&self, request: TurnRequest) -> NodeStream {
        let (tx, rx) = mpsc::channel(64);
        let executor = self.clone();
        tokio::spawn(async move {
            let _guard = executor.locks.acquire(&request.thread_id).await;
            let sink = Sink(Some(tx.clone()));
            if let Err(e) = executor.run_locked(request, &sink).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }

    async fn run_locked(&self, request: TurnRequest, sink: &Sink) -> Result<TurnResult, TurnError> {
        let mut state = self
            .store
            .load(&request.thread_id)
            .await?
            .unwrap_or_else(|| ThreadState::new(&request.thread_id));

        if state.is_suspended() {
            return Err(TurnError::ApprovalPending {
                thread_id: request.thread_id,
            });
        }

        let turn = Turn::start(&request.input, request.metadata);
        info!(thread_id = %state.thread_id, turn_id = %turn.id, "turn started");
        state.conversation.add_user_message(request.input);
        state.turns.push(turn);
        self.persist(&mut state).await?;

        self.drive(&mut state, sink).await
    }

    async fn resume_locked(
        &self,
        thread_id: &str,
        feedback: InterruptionMetadata,
        sink: &Sink,
    ) -> Result<TurnResult, TurnError> {
        let mut state = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| TurnError::invalid_resume(thread_id, "unknown thread"))?;
        let pending = state
            .pending
            .clone()
            .ok_or_else(|| TurnError::invalid_resume(thread_id, "no suspended turn"))?;

        let ids = |m: &InterruptionMetadata| -> Vec<String> {
            m.tool_feedbacks.iter().map(|f| f.tool_call_id.clone()).collect()
        };
        if feedback.turn_id != pending.turn_id || ids(&feedback) != ids(&pending) {
            return Err(TurnError::invalid_resume(
                thread_id,
                "feedback does not match the pending interruption",
            ));
        }
        let undecided = feedback.undecided();
        if !undecided.is_empty() {
            return Err(TurnError::IncompleteFeedback { pending: undecided });
        }

        // Clear the suspension before any protected tool runs so a crash
        // mid-resume can never execute the same call twice.
        state.pending = None;
        state.conversation = Conversation::from_messages(pending.snapshot.messages);
        state.scratch = pending.snapshot.scratch;
        let metadata = match state.last_turn_mut() {
            Some(turn) => {
                turn.status = TurnStatus::InProgress;
                turn.iterations = pending.snapshot.iteration;
                turn.metadata.clone()
            }
            None => return Err(TurnError::invalid_resume(thread_id, "thread has no turns")),
        };
        self.persist(&mut state).await?;
        info!(thread_id, turn_id = %pending.turn_id, count = feedback.tool_feedbacks.len(), "turn resumed");

        let context = ToolContext::new(thread_id, metadata);
        for entry in &feedback.tool_feedbacks {
            let call = ToolCall {
                id: entry.tool_call_id.clone(),
                name: entry.name.clone(),
                input: entry.effective_arguments().clone(),
            };
            let result = match entry.result {
                FeedbackResult::Approved => self.execute_tool(&call, &context).await,
                _ => {
                    info!(thread_id, tool = %call.name, "tool call denied");
                    ToolResult::error(&call.id, rejection_notice(entry))
                }
            };
            self.fold(&mut state, &call.name, result, sink).await?;
        }

        self.drive(&mut state, sink).await
    }

    async fn continue_locked(
        &self,
        thread_id: &str,
        metadata: &RunMetadata,
        sink: &Sink,
    ) -> Result<TurnResult, TurnError> {
        let mut state = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| TurnError::UnknownThread(thread_id.to_string()))?;

        if let Some(pending) = &state.pending {
            return Ok(TurnResult::Suspended(pending.clone()));
        }
        let status = match state.last_turn_mut() {
            Some(turn) => {
                if turn.metadata.is_empty() {
                    turn.metadata = metadata.clone();
                }
                turn.status
            }
            None => return Err(TurnError::invalid_resume(thread_id, "thread has no turns")),
        };
        match status {
            TurnStatus::Completed => state
                .last_output()
                .map(TurnResult::Completed)
                .ok_or_else(|| TurnError::invalid_resume(thread_id, "thread has no turns")),
            TurnStatus::Suspended => Err(TurnError::invalid_resume(
                thread_id,
                "turn is suspended without a pending interruption",
            )),
            TurnStatus::InProgress | TurnStatus::Failed => {
                debug!(thread_id, ?status, "continuing turn");
                if let Some(turn) = state.last_turn_mut() {
                    turn.status = TurnStatus::InProgress;
                    turn.error = None;
                }
                let unresolved = state.conversation.unresolved_tool_calls();
                if !unresolved.is_empty() {
                    if let Some(interruption) = self.dispatch(&mut state, &unresolved, sink).await? {
                        return Ok(TurnResult::Suspended(interruption));
                    }
                }
                self.drive(&mut state, sink).await
            }
        }
    }

    /// The reasoning loop, starting at the current turn's iteration count.
    async fn drive(&self, state: &mut ThreadState, sink: &Sink) -> Result<TurnResult, TurnError> {
        loop {
            let iteration = state.last_turn().map_or(0, |t| t.iterations);
            if iteration >= self.settings.max_iterations {
                let err = TurnError::MaxIterations(self.settings.max_iterations);
                return Err(self.fail(state, err).await);
            }
            debug!(thread_id = %state.thread_id, iteration, "reasoning iteration");

            let content = match self.reason(state, sink).await {
                Ok(content) => content,
                Err(e) => return Err(self.fail(state, e).await),
            };
            if let Some(turn) = state.last_turn_mut() {
                turn.iterations += 1;
            }
            let calls = content.tool_calls.clone();
            state.conversation.add_assistant_response(content);
            self.persist(state).await?;

            if calls.is_empty() {
                return self.complete(state, sink).await;
            }
            sink.emit(NodeOutput::ToolCalls {
                calls: calls.clone(),
            })
            .await;
            if let Some(interruption) = self.dispatch(state, &calls, sink).await? {
                return Ok(TurnResult::Suspended(interruption));
            }
        }
    }

    /// One model call through the interceptor chain.
    async fn reason(&self, state: &ThreadState, sink: &Sink) -> Result<AssistantContent, TurnError> {
        let window = state
            .conversation
            .window(self.settings.context_window_tokens)
            .to_vec();

        for interceptor in &self.interceptors {
            if let Some(reply) = interceptor.before_model(&window).await {
                info!(thread_id = %state.thread_id, interceptor = interceptor.name(), "model call short-circuited");
                if let Some(text) = &reply.text {
                    sink.emit(NodeOutput::AssistantDelta { text: text.clone() })
                        .await;
                }
                return Ok(reply);
            }
        }

        let request = ModelRequest {
            messages: window.clone(),
            system_prompt: self.settings.system_prompt.clone(),
            tools: self.registry.list(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let started = Instant::now();
        let mut stream = self
            .provider
            .stream_with_tools(request)
            .await
            .map_err(|e| TurnError::Upstream(e.to_string()))?;

        let mut accumulator = ResponseAccumulator::new();
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| TurnError::Upstream(e.to_string()))?;
            if let StreamEvent::TextDelta { text } = &event {
                sink.emit(NodeOutput::AssistantDelta { text: text.clone() })
                    .await;
            }
            accumulator.push(&event);
        }

        let errors = accumulator.errors().to_vec();
        let content = accumulator.finish();
        if !errors.is_empty() {
            warn!(thread_id = %state.thread_id, ?errors, "provider reported stream errors");
            if content.text.is_none() && content.tool_calls.is_empty() {
                return Err(TurnError::Upstream(errors.join("; ")));
            }
        }

        let elapsed = started.elapsed();
        for interceptor in &self.interceptors {
            interceptor.after_model(&window, &content, elapsed).await;
        }
        Ok(content)
    }

    /// Run auto-execute calls in request order; batch every protected call
    /// into one interruption.
    async fn dispatch(
        &self,
        state: &mut ThreadState,
        calls: &[ToolCall],
        sink: &Sink,
    ) -> Result<Option<InterruptionMetadata>, TurnError> {
        let Some(turn) = state.last_turn() else {
            return Err(TurnError::invalid_resume(&state.thread_id, "thread has no turns"));
        };
        let context = ToolContext::new(&state.thread_id, turn.metadata.clone());

        let mut protected = Vec::new();
        for call in calls {
            match self.registry.policy_for(&call.name) {
                ToolPolicy::AutoExecute => {
                    let result = self.execute_tool(call, &context).await;
                    self.fold(state, &call.name, result, sink).await?;
                }
                ToolPolicy::RequiresApproval => protected.push(call),
            }
        }
        if protected.is_empty() {
            return Ok(None);
        }

        let Some(turn) = state.last_turn_mut() else {
            return Err(TurnError::invalid_resume(&state.thread_id, "thread has no turns"));
        };
        turn.status = TurnStatus::Suspended;
        let turn_id = turn.id.clone();
        let iteration = turn.iterations;

        let interruption = InterruptionMetadata {
            node: APPROVAL_NODE.to_string(),
            thread_id: state.thread_id.clone(),
            turn_id,
            snapshot: StateSnapshot {
                messages: state.conversation.messages().to_vec(),
                scratch: state.scratch.clone(),
                iteration,
            },
            tool_feedbacks: protected
                .iter()
                .map(|call| ToolFeedback::pending(call, self.registry.approval_description(&call.name)))
                .collect(),
        };
        state.pending = Some(interruption.clone());
        self.persist(state).await?;

        let tools: Vec<&str> = protected.iter().map(|c| c.name.as_str()).collect();
        info!(thread_id = %state.thread_id, ?tools, "turn suspended for approval");
        sink.emit(NodeOutput::Interruption(interruption.clone())).await;
        Ok(Some(interruption))
    }

    async fn execute_tool(&self, call: &ToolCall, context: &ToolContext) -> ToolResult {
        info!(thread_id = %context.thread_id, tool = %call.name, "executing tool");
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };
        match tool.execute(call.input.clone(), context).await {
            Ok(mut result) => {
                result.tool_call_id = call.id.clone();
                result
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolResult::error(&call.id, format!("Tool error: {e}"))
            }
        }
    }

    async fn fold(
        &self,
        state: &mut ThreadState,
        tool: &str,
        result: ToolResult,
        sink: &Sink,
    ) -> Result<(), TurnError> {
        state.conversation.add_tool_result(result.clone());
        self.persist(state).await?;
        sink.emit(NodeOutput::ToolResult {
            tool: tool.to_string(),
            result,
        })
        .await;
        Ok(())
    }

    async fn complete(&self, state: &mut ThreadState, sink: &Sink) -> Result<TurnResult, TurnError> {
        let text = state.last_output().map(|o| o.text).unwrap_or_default();
        if let Some(turn) = state.last_turn_mut() {
            turn.status = TurnStatus::Completed;
            turn.output = Some(text);
            turn.finished_at = Some(Utc::now());
        }
        self.persist(state).await?;

        let output = state
            .last_output()
            .ok_or_else(|| TurnError::invalid_resume(&state.thread_id, "thread has no turns"))?;
        info!(thread_id = %state.thread_id, turn_id = %output.turn_id, "turn completed");
        sink.emit(NodeOutput::End {
            output: Some(output.clone()),
        })
        .await;
        Ok(TurnResult::Completed(output))
    }

    /// Mark the turn failed and persist what has been folded so far.
    async fn fail(&self, state: &mut ThreadState, err: TurnError) -> TurnError {
        if let Some(turn) = state.last_turn_mut() {
            turn.status = TurnStatus::Failed;
            turn.error = Some(err.to_string());
            turn.finished_at = Some(Utc::now());
        }
        warn!(thread_id = %state.thread_id, error = %err, "turn failed");
        if let Err(store_err) = self.persist(state).await {
            warn!(thread_id = %state.thread_id, error = %store_err, "failed to persist failed turn");
        }
        err
    }

    async fn persist(&self, state: &mut ThreadState) -> Result<(), TurnError> {
        state.touch();
        self.store.save(state).await?;
        Ok(())
    }
}

fn rejection_notice(feedback: &ToolFeedback) -> String {
    match &feedback.reason {
        Some(reason) => format!("Tool call '{}' was rejected by the approver: {reason}", feedback.name),
        None => format!("Tool call '{}' was rejected by the approver", feedback.name),
    }
}

#[async_trait]
impl TurnRunner for TurnExecutor {
    fn stream(&self, request: TurnRequest) -> NodeStream {
        self.run_streaming(request)
    }

    async fn continue_turn(
        &self,
        thread_id: &str,
        metadata: &RunMetadata,
    ) -> Result<TurnResult, TurnError> {
        TurnExecutor::continue_turn(self, thread_id, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{ContentFilter, BLOCKED_CONTENT_REPLY};
    use crate::interruption::{InterruptionController, ToolDecision};
    use crate::thread::MemoryThreadStore;
    use serde_json::json;
    use showroom_tool_runtime::provider::mock::MockLlmProvider;
    use showroom_tool_runtime::{
        AccountInfoTool, CarBrandTool, PlaceOrderTool, SaleCarsInfoTool, StopReason, NO_VALID_USER,
    };

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(AccountInfoTool).unwrap();
        registry.register(CarBrandTool).unwrap();
        registry.register(SaleCarsInfoTool).unwrap();
        registry
            .register_protected(PlaceOrderTool, Some("下单操作需要人工审批"))
            .unwrap();
        Arc::new(registry)
    }

    fn executor(mock: Arc<MockLlmProvider>) -> TurnExecutor {
        TurnExecutor::new(mock, registry(), Arc::new(MemoryThreadStore::new()))
    }

    fn tool_call_events(calls: &[(&str, &str, serde_json::Value)]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for (id, name, args) in calls {
            events.push(StreamEvent::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            });
            events.push(StreamEvent::ToolCallDelta {
                id: id.to_string(),
                arguments_delta: args.to_string(),
            });
            events.push(StreamEvent::ToolCallEnd { id: id.to_string() });
        }
        events.push(StreamEvent::MessageEnd {
            stop_reason: StopReason::ToolUse,
        });
        events
    }

    fn suspended(result: TurnResult) -> InterruptionMetadata {
        match result {
            TurnResult::Suspended(meta) => meta,
            other => panic!("expected suspension, got {other:?}"),
        }
    }

    fn completed(result: TurnResult) -> TurnOutput {
        match result {
            TurnResult::Completed(output) => output,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_tools_never_suspend() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "carBrandTool", json!({}));
        mock.queue_text("我们销售奔驰，宝马，奥迪。");
        let exec = executor(mock.clone());

        let output = completed(exec.run(TurnRequest::new("t1", "有哪些品牌？")).await.unwrap());
        assert_eq!(output.text, "我们销售奔驰，宝马，奥迪。");
        assert_eq!(output.tool_results.len(), 1);
        assert_eq!(output.tool_results[0].tool_call_id, "c1");

        let state = exec.thread("t1").await.unwrap().unwrap();
        assert!(state.pending.is_none());
        assert_eq!(state.turns[0].status, TurnStatus::Completed);
        assert_eq!(mock.call_count(), 2);
        // The second model call sees the tool result.
        assert_eq!(mock.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_place_order_requires_approval() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("call_1", "placeOrderTool", json!({"orderInfo": "model X"}));
        mock.queue_text("已为您下单成功");
        let exec = executor(mock.clone());

        let request = TurnRequest::new("42", "place an order for model X")
            .with_metadata(RunMetadata::for_user("42"));
        let meta = suspended(exec.run(request).await.unwrap());
        assert_eq!(meta.tool_feedbacks.len(), 1);
        assert_eq!(meta.tool_feedbacks[0].name, "placeOrderTool");
        assert_eq!(meta.tool_feedbacks[0].description, "下单操作需要人工审批");

        let state = exec.thread("42").await.unwrap().unwrap();
        assert_eq!(state.pending.as_ref(), Some(&meta));
        assert_eq!(state.turns[0].status, TurnStatus::Suspended);

        let decided = InterruptionController::new()
            .apply_decision(&meta, &[ToolDecision::approve_tool("placeOrderTool")])
            .unwrap();
        let output = completed(exec.resume("42", decided).await.unwrap());
        assert_eq!(output.tool_results[0].content, "用户id：42，下单成功");
        assert!(output.text.contains("下单成功"));

        let state = exec.thread("42").await.unwrap().unwrap();
        assert!(state.pending.is_none());
        assert_eq!(state.turns[0].status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_user_completes_with_refusal() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "accountInfoTool", json!({}));
        mock.queue_text("抱歉，无法获取您的账号信息");
        let exec = executor(mock);

        let output = completed(exec.run(TurnRequest::new("7", "查一下我的账户")).await.unwrap());
        assert_eq!(output.tool_results[0].content, NO_VALID_USER);
        assert!(!output.tool_results[0].is_error);
    }

    #[tokio::test]
    async fn test_protected_calls_batched_in_order() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_response(tool_call_events(&[
            ("p1", "placeOrderTool", json!({"orderInfo": "奥迪A4L"})),
            ("a1", "saleCarsInfoTool", json!({})),
            ("p2", "placeOrderTool", json!({"orderInfo": "奥迪A6L"})),
        ]));
        let exec = executor(mock);

        let meta = suspended(exec.run(TurnRequest::new("b", "两台都下单")).await.unwrap());
        let ids: Vec<_> = meta.tool_feedbacks.iter().map(|f| f.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        // The auto call of the same batch already ran.
        let state = exec.thread("b").await.unwrap().unwrap();
        let unresolved: Vec<_> = state
            .conversation
            .unresolved_tool_calls()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(unresolved, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_second_feedback_is_invalid_resume() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "placeOrderTool", json!({}));
        mock.queue_text("done");
        let exec = executor(mock);

        let meta = suspended(
            exec.run(TurnRequest::new("x", "order").with_metadata(RunMetadata::for_user("1")))
                .await
                .unwrap(),
        );
        let decided = InterruptionController::new()
            .apply_decision(&meta, &[ToolDecision::approve("c1")])
            .unwrap();
        exec.resume("x", decided.clone()).await.unwrap();

        let err = exec.resume("x", decided).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidResumeState");
    }

    #[tokio::test]
    async fn test_pending_verdict_leaves_state_unchanged() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "placeOrderTool", json!({}));
        let exec = executor(mock.clone());

        let meta = suspended(exec.run(TurnRequest::new("p", "order")).await.unwrap());
        let before = exec.thread("p").await.unwrap().unwrap();

        let err = exec.resume("p", meta).await.unwrap_err();
        assert!(matches!(err, TurnError::IncompleteFeedback { .. }));
        assert_eq!(exec.thread("p").await.unwrap().unwrap(), before);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_without_suspension() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("hi");
        let exec = executor(mock);
        exec.run(TurnRequest::new("n", "hello")).await.unwrap();

        let meta = InterruptionMetadata {
            node: APPROVAL_NODE.into(),
            thread_id: "n".into(),
            turn_id: "whatever".into(),
            snapshot: StateSnapshot {
                messages: Vec::new(),
                scratch: Default::default(),
                iteration: 0,
            },
            tool_feedbacks: Vec::new(),
        };
        assert!(matches!(
            exec.resume("n", meta.clone()).await,
            Err(TurnError::InvalidResumeState { .. })
        ));
        assert!(matches!(
            exec.resume("unknown", meta).await,
            Err(TurnError::InvalidResumeState { .. })
        ));
    }

    #[tokio::test]
    async fn test_denied_call_folds_rejection() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "placeOrderTool", json!({}));
        mock.queue_text("好的，已取消下单");
        let exec = executor(mock);

        let meta = suspended(
            exec.run(TurnRequest::new("d", "order").with_metadata(RunMetadata::for_user("2")))
                .await
                .unwrap(),
        );
        let decided = InterruptionController::new()
            .apply_decision(&meta, &[ToolDecision::deny("c1", "价格有误")])
            .unwrap();
        let output = completed(exec.resume("d", decided).await.unwrap());
        assert!(output.tool_results[0].is_error);
        assert!(output.tool_results[0].content.contains("价格有误"));
        assert!(!output.tool_results[0].content.contains("下单成功"));
    }

    #[tokio::test]
    async fn test_run_while_suspended_is_rejected() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "placeOrderTool", json!({}));
        let exec = executor(mock);
        exec.run(TurnRequest::new("s", "order")).await.unwrap();

        let err = exec.run(TurnRequest::new("s", "again")).await.unwrap_err();
        assert_eq!(err.kind(), "ApprovalPending");
        assert!(exec.thread("s").await.unwrap().unwrap().pending.is_some());
    }

    #[tokio::test]
    async fn test_upstream_failure_marks_turn_failed() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "carBrandTool", json!({}));
        mock.queue_failure("model unavailable");
        let exec = executor(mock);

        let err = exec.run(TurnRequest::new("f", "brands?")).await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamExecutionFailure");

        let state = exec.thread("f").await.unwrap().unwrap();
        assert_eq!(state.turns[0].status, TurnStatus::Failed);
        // Tool result folded before the failure is kept.
        assert_eq!(state.conversation.len(), 3);
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let mock = Arc::new(MockLlmProvider::new());
        for i in 0..3 {
            mock.queue_tool_call(&format!("c{i}"), "carBrandTool", json!({}));
        }
        let exec = executor(mock).with_max_iterations(2);
        let err = exec.run(TurnRequest::new("m", "loop")).await.unwrap_err();
        assert!(matches!(err, TurnError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn test_continue_turn_dispatches_unresolved_calls() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "carBrandTool", json!({}));
        mock.queue_failure("transient");
        mock.queue_text("奔驰，宝马，奥迪");
        let exec = executor(mock);

        assert!(exec.run(TurnRequest::new("c", "brands")).await.is_err());
        let output = completed(exec.continue_turn("c", &RunMetadata::new()).await.unwrap());
        assert_eq!(output.text, "奔驰，宝马，奥迪");

        // A completed turn just reports its output again.
        let again = completed(exec.continue_turn("c", &RunMetadata::new()).await.unwrap());
        assert_eq!(again, output);
        assert!(matches!(
            exec.continue_turn("nope", &RunMetadata::new()).await,
            Err(TurnError::UnknownThread(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_folded_as_error() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "teleportTool", json!({}));
        mock.queue_text("sorry");
        let exec = executor(mock);

        let output = completed(exec.run(TurnRequest::new("u", "?")).await.unwrap());
        assert_eq!(output.tool_results[0].content, "Unknown tool: teleportTool");
        assert!(output.tool_results[0].is_error);
    }

    #[tokio::test]
    async fn test_content_filter_skips_model() {
        let mock = Arc::new(MockLlmProvider::new());
        let exec = executor(mock.clone())
            .with_interceptor(Arc::new(ContentFilter::new(vec!["草泥马".into()])));

        let output = completed(exec.run(TurnRequest::new("cf", "草泥马")).await.unwrap());
        assert_eq!(output.text, BLOCKED_CONTENT_REPLY);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("a");
        mock.queue_text("b");
        let exec = executor(mock);

        let (a, b) = tokio::join!(
            exec.run(TurnRequest::new("A", "one")),
            exec.run(TurnRequest::new("B", "two")),
        );
        a.unwrap();
        b.unwrap();

        let state_a = exec.thread("A").await.unwrap().unwrap();
        let state_b = exec.thread("B").await.unwrap().unwrap();
        assert_eq!(state_a.conversation.last_user_message(), Some("one"));
        assert_eq!(state_b.conversation.last_user_message(), Some("two"));
        assert_eq!(state_a.turns.len(), 1);
        assert_eq!(exec.threads().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_streaming_emits_steps_in_order() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "saleCarsInfoTool", json!({"carName": "奥迪"}));
        mock.queue_text("奥迪A4L 有货");
        let exec = executor(mock);

        let outputs: Vec<NodeOutput> = exec
            .run_streaming(TurnRequest::new("st", "奥迪有什么车？"))
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert!(matches!(outputs[0], NodeOutput::ToolCalls { .. }));
        assert!(matches!(&outputs[1], NodeOutput::ToolResult { tool, .. } if tool == "saleCarsInfoTool"));
        assert!(matches!(&outputs[2], NodeOutput::AssistantDelta { text } if text == "奥迪A4L 有货"));
        match &outputs[3] {
            NodeOutput::End { output: Some(output) } => assert_eq!(output.text, "奥迪A4L 有货"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(outputs.len(), 4);
    }

    #[tokio::test]
    async fn test_run_streaming_stops_at_interruption() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "placeOrderTool", json!({}));
        let exec = executor(mock);

        let outputs: Vec<_> = exec
            .run_streaming(TurnRequest::new("si", "order"))
            .collect()
            .await;
        assert_eq!(outputs.len(), 2);
        assert!(matches!(outputs[1], Ok(NodeOutput::Interruption(_))));
    }

    #[tokio::test]
    async fn test_dropped_stream_still_persists() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_tool_call("c1", "carBrandTool", json!({}));
        mock.queue_text("done");
        let exec = executor(mock);

        drop(exec.run_streaming(TurnRequest::new("drop", "brands")));

        let mut status = None;
        for _ in 0..100 {
            status = exec
                .thread("drop")
                .await
                .unwrap()
                .and_then(|s| s.last_turn().map(|t| t.status));
            if status == Some(TurnStatus::Completed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(TurnStatus::Completed));
        let state = exec.thread("drop").await.unwrap().unwrap();
        assert_eq!(state.last_output().unwrap().text, "done");
    }
}
