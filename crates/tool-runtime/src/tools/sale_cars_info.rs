use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tool::{
    single_text_schema, text_argument, Tool, ToolContext, ToolDefinition, ToolError, ToolResult,
};

#[derive(Debug, Serialize)]
struct CarListing {
    id: u32,
    name: &'static str,
    price: u32,
    color: &'static str,
    inventory: u32,
}

const INVENTORY: &[CarListing] = &[
    CarListing { id: 1, name: "奔驰C260L", price: 300_000, color: "白色", inventory: 3 },
    CarListing { id: 2, name: "宝马325Li", price: 200_000, color: "黑色", inventory: 0 },
    CarListing { id: 3, name: "宝马330Li", price: 250_000, color: "红色", inventory: 5 },
    CarListing { id: 4, name: "奥迪A4L", price: 220_000, color: "蓝色", inventory: 6 },
    CarListing { id: 5, name: "奥迪A6L", price: 280_000, color: "绿色", inventory: 1 },
];

/// The showroom's model catalogue with prices and stock.
///
/// An optional `carName` narrows the listing to matching models; a name that
/// matches nothing returns the whole catalogue so the model can still answer.
pub struct SaleCarsInfoTool;

#[async_trait]
impl Tool for SaleCarsInfoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "saleCarsInfoTool".to_string(),
            description: "查询销售的车型信息".to_string(),
            input_schema: single_text_schema("carName", "车型名称，可选"),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let filter = text_argument(&input, "carName").filter(|s| !s.trim().is_empty());

        let matching: Vec<&CarListing> = match &filter {
            Some(name) => INVENTORY
                .iter()
                .filter(|car| car.name.contains(name.trim()))
                .collect(),
            None => Vec::new(),
        };
        let listing: Vec<&CarListing> = if matching.is_empty() {
            INVENTORY.iter().collect()
        } else {
            matching
        };

        let content = serde_json::to_string(&listing)
            .map_err(|e| ToolError::ExecutionFailed(format!("JSON serialization failed: {e}")))?;
        Ok(ToolResult::text(String::new(), content))
    }
}
