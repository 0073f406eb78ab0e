pub mod openai_compat;

use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;

use showroom_core::config::LlmConfig;
use showroom_tool_runtime::{LlmError, ToolAwareLlmProvider};

use self::openai_compat::OpenAiCompatProvider;

/// Build the reasoning provider named by `config.provider`.
///
/// DashScope is reached through its OpenAI-compatible mode, so both
/// supported providers share one implementation.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ToolAwareLlmProvider>, LlmError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| LlmError::Other(anyhow!("no API key configured for provider '{}'", config.provider)))?;

    match config.provider.as_str() {
        "dashscope" | "openai" => {
            info!(provider = %config.provider, model = %config.model, base_url = %config.base_url, "LLM provider configured");
            Ok(Arc::new(
                OpenAiCompatProvider::new(api_key, config.model.clone(), config.base_url.clone())
                    .with_name(config.provider.clone()),
            ))
        }
        other => Err(LlmError::Other(anyhow!("unsupported LLM provider: {other}"))),
    }
}
