pub mod tool;
pub mod tools;
pub mod registry;
pub mod provider;
pub mod permission;
pub mod conversation;
pub mod stream;

pub use tool::{Tool, ToolCall, ToolContext, ToolDefinition, ToolError, ToolResult};
pub use registry::{RegistryError, ToolRegistry};
pub use provider::{EventStream, LlmError, ModelRequest, ToolAwareLlmProvider};
pub use permission::{ApprovalPolicy, ToolPolicy};
pub use conversation::{AssistantContent, Conversation, ConversationMessage};
pub use stream::{ResponseAccumulator, StopReason, StreamEvent};
pub use tools::{AccountInfoTool, CarBrandTool, PlaceOrderTool, SaleCarsInfoTool, NO_VALID_USER};
