use crate::permission::{ApprovalPolicy, ToolPolicy};
use crate::tool::{Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Manages available tools, their schemas, approval policy and lookup.
///
/// Built once at startup and shared by reference; never mutated while turns run.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    policy: ApprovalPolicy,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            policy: ApprovalPolicy::new(),
        }
    }

    /// Start from an existing policy (e.g. one with a strict default).
    pub fn with_policy(policy: ApprovalPolicy) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    /// Register a tool under the registry's policy. Returns error if name already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        let def = tool.definition();
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        self.tools.insert(def.name, Arc::new(tool));
        Ok(())
    }

    /// Register a tool whose every invocation needs external approval.
    pub fn register_protected(
        &mut self,
        tool: impl Tool + 'static,
        approval_note: Option<&str>,
    ) -> Result<(), RegistryError> {
        let name = tool.definition().name;
        self.register(tool)?;
        self.policy
            .require_approval(name, approval_note.map(String::from));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool definitions (for sending to LLM), sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn policy_for(&self, name: &str) -> ToolPolicy {
        self.policy.level_for(name)
    }

    /// Text shown to an approver for a call to `name`: the approval note if
    /// one was declared, else the tool's own description.
    pub fn approval_description(&self, name: &str) -> String {
        if let Some(note) = self.policy.approval_note(name) {
            return note.to_string();
        }
        self.tools
            .get(name)
            .map(|t| t.definition().description)
            .unwrap_or_default()
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}
