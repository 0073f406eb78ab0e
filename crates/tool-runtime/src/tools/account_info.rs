use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::NO_VALID_USER;
use crate::tool::{single_text_schema, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

#[derive(Debug, Serialize)]
struct Account {
    name: &'static str,
    account_type: &'static str,
    balance: u64,
    email: &'static str,
}

const ACCOUNTS: &[(&str, Account)] = &[
    (
        "1",
        Account {
            name: "Alice Johnson",
            account_type: "Premium",
            balance: 5000,
            email: "alice@example.com",
        },
    ),
    (
        "2",
        Account {
            name: "Bob Smith",
            account_type: "Standard",
            balance: 1200,
            email: "bob@example.com",
        },
    ),
];

/// Account details of the user the run acts for.
pub struct AccountInfoTool;

#[async_trait]
impl Tool for AccountInfoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "accountInfoTool".to_string(),
            description: "查询当前用户的账号信息".to_string(),
            input_schema: single_text_schema("input", "可选的查询说明"),
        }
    }

    async fn execute(&self, _input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let Some(user_id) = context.user_id() else {
            debug!(thread_id = %context.thread_id, "account lookup without user_id");
            return Ok(ToolResult::text(String::new(), NO_VALID_USER));
        };

        let Some((_, account)) = ACCOUNTS.iter().find(|(id, _)| *id == user_id) else {
            return Ok(ToolResult::text(String::new(), "用户不存在"));
        };

        let content = serde_json::to_string(account)
            .map_err(|e| ToolError::ExecutionFailed(format!("JSON serialization failed: {e}")))?;
        Ok(ToolResult::text(String::new(), content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn test_known_user() {
        let result = AccountInfoTool
            .execute(Value::Null, &test_context(Some("1")))
            .await
            .unwrap();
        let account: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(account["name"], "Alice Johnson");
        assert_eq!(account["balance"], 5000);
    }

    #[tokio::test]
    async fn test_missing_user_is_plain_refusal() {
        let result = AccountInfoTool
            .execute(Value::Null, &test_context(None))
            .await
            .unwrap();
        assert_eq!(result.content, NO_VALID_USER);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let result = AccountInfoTool
            .execute(Value::Null, &test_context(Some("99")))
            .await
            .unwrap();
        assert_eq!(result.content, "用户不存在");
    }
}
