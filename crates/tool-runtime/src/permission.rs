use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a tool may run as soon as the model asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolPolicy {
    /// Tool executes without asking anyone
    AutoExecute,
    /// Turn suspends until an external approver decides
    RequiresApproval,
}

/// A per-tool rule: the policy plus an optional note shown to the approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub policy: ToolPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_note: Option<String>,
}

/// Maps tool names to policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Explicit per-tool rules
    pub rules: HashMap<String, PolicyRule>,
    /// Default policy for tools not in the rules map
    pub default: ToolPolicy,
}

impl ApprovalPolicy {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            default: ToolPolicy::AutoExecute,
        }
    }

    /// Require approval for `tool_name` (or a `prefix*` pattern).
    pub fn require_approval(&mut self, tool_name: impl Into<String>, note: Option<String>) {
        self.rules.insert(
            tool_name.into(),
            PolicyRule {
                policy: ToolPolicy::RequiresApproval,
                approval_note: note,
            },
        );
    }

    pub fn auto_execute(&mut self, tool_name: impl Into<String>) {
        self.rules.insert(
            tool_name.into(),
            PolicyRule {
                policy: ToolPolicy::AutoExecute,
                approval_note: None,
            },
        );
    }

    fn rule_for(&self, tool_name: &str) -> Option<&PolicyRule> {
        if let Some(rule) = self.rules.get(tool_name) {
            return Some(rule);
        }
        // Longest matching "prefix*" pattern wins.
        self.rules
            .iter()
            .filter_map(|(pattern, rule)| {
                let prefix = pattern.strip_suffix('*')?;
                tool_name.starts_with(prefix).then_some((prefix.len(), rule))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, rule)| rule)
    }

    /// Get the policy for a given tool name.
    /// Checks exact match first, then glob patterns, then default.
    pub fn level_for(&self, tool_name: &str) -> ToolPolicy {
        self.rule_for(tool_name)
            .map(|rule| rule.policy)
            .unwrap_or(self.default)
    }

    pub fn approval_note(&self, tool_name: &str) -> Option<&str> {
        self.rule_for(tool_name)
            .and_then(|rule| rule.approval_note.as_deref())
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ApprovalPolicy::new();
        assert_eq!(policy.level_for("anything"), ToolPolicy::AutoExecute);
        assert_eq!(policy.approval_note("anything"), None);
    }

    #[test]
    fn test_explicit_rule() {
        let mut policy = ApprovalPolicy::new();
        policy.require_approval("placeOrderTool", Some("下单操作需要人工审批".to_string()));
        assert_eq!(
            policy.level_for("placeOrderTool"),
            ToolPolicy::RequiresApproval
        );
        assert_eq!(
            policy.approval_note("placeOrderTool"),
            Some("下单操作需要人工审批")
        );
        assert_eq!(policy.level_for("accountInfoTool"), ToolPolicy::AutoExecute);
    }

    #[test]
    fn test_glob_pattern() {
        let mut policy = ApprovalPolicy::new();
        policy.require_approval("place*", None);
        policy.auto_execute("placeholder*");
        assert_eq!(policy.level_for("placeOrderTool"), ToolPolicy::RequiresApproval);
        assert_eq!(policy.level_for("placeholderTool"), ToolPolicy::AutoExecute);
        assert_eq!(policy.level_for("carBrandTool"), ToolPolicy::AutoExecute);
    }

    #[test]
    fn test_strict_default() {
        let mut policy = ApprovalPolicy::new();
        policy.default = ToolPolicy::RequiresApproval;
        policy.auto_execute("carBrandTool");
        assert_eq!(policy.level_for("carBrandTool"), ToolPolicy::AutoExecute);
        assert_eq!(policy.level_for("unknown"), ToolPolicy::RequiresApproval);
    }

    #[test]
    fn test_policy_serialization() {
        let json = serde_json::to_string(&ToolPolicy::RequiresApproval).unwrap();
        assert_eq!(json, "\"REQUIRES_APPROVAL\"");
    }
}
