use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub const BRANDS_ON_SALE: &str = "我们销售的品牌有：奔驰，宝马，奥迪。";

pub struct CarBrandTool;

#[async_trait]
impl Tool for CarBrandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "carBrandTool".to_string(),
            description: "查询销售的汽车品牌".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::text(String::new(), BRANDS_ON_SALE))
    }
}
