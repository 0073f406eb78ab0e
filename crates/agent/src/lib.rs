pub mod error;
pub mod executor;
pub mod interceptor;
pub mod interruption;
pub mod node;
pub mod service;
pub mod store;
pub mod streaming;
pub mod thread;

pub use error::TurnError;
pub use executor::{ExecutorSettings, ThreadLocks, TurnExecutor, TurnRequest, TurnResult, TurnRunner};
pub use interceptor::{ContentFilter, ModelInterceptor, ModelTimingLogger};
pub use interruption::{
    ApprovalRequest, FeedbackResult, InterruptionController, InterruptionMetadata, PendingCall,
    StateSnapshot, ToolDecision, ToolFeedback,
};
pub use node::{NodeOutput, NodeStream, END_NODE};
pub use service::{AgentService, Health, InvokeOutcome};
pub use store::FileThreadStore;
pub use streaming::{AgentEvent, AgentEventStream, StreamingAdapter, INVOKE_RESULT_NODE};
pub use thread::{
    MemoryThreadStore, StoreError, ThreadState, ThreadStore, ThreadSummary, Turn, TurnOutput,
    TurnStatus,
};
