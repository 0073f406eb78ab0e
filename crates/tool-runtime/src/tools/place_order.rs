use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::NO_VALID_USER;
use crate::tool::{
    single_text_schema, text_argument, Tool, ToolContext, ToolDefinition, ToolError, ToolResult,
};

/// Places an order for the current user. Registered as a protected tool.
pub struct PlaceOrderTool;

#[async_trait]
impl Tool for PlaceOrderTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "placeOrderTool".to_string(),
            description: "下单操作".to_string(),
            input_schema: single_text_schema("orderInfo", "客户信息和下单的汽车品牌车型信息"),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let Some(user_id) = context.user_id() else {
            return Ok(ToolResult::text(String::new(), NO_VALID_USER));
        };
        let order_info = text_argument(&input, "orderInfo").unwrap_or_default();
        info!(thread_id = %context.thread_id, user_id = %user_id, order_info = %order_info, "order placed");

        Ok(ToolResult::text(
            String::new(),
            format!("用户id：{user_id}，下单成功"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn test_order_success() {
        let result = PlaceOrderTool
            .execute(
                serde_json::json!({"orderInfo": "张三 奥迪A4L"}),
                &test_context(Some("42")),
            )
            .await
            .unwrap();
        assert_eq!(result.content, "用户id：42，下单成功");
    }

    #[tokio::test]
    async fn test_order_without_user() {
        let result = PlaceOrderTool
            .execute(Value::Null, &test_context(None))
            .await
            .unwrap();
        assert_eq!(result.content, NO_VALID_USER);
    }
}
