//! Wiring of the agent service from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use showroom_agent::{
    AgentService, ContentFilter, ExecutorSettings, FileThreadStore, InterruptionController,
    MemoryThreadStore, ModelTimingLogger, ThreadStore, TurnExecutor,
};
use showroom_core::Config;
use showroom_tool_runtime::{
    AccountInfoTool, CarBrandTool, PlaceOrderTool, SaleCarsInfoTool, ToolAwareLlmProvider,
    ToolRegistry,
};

pub const SYSTEM_PROMPT: &str = "\
你是一个汽车门店的销售经理，你的任务是根据用户的问题，给出相应的回答。
客户询问销售的车型，你可以使用carBrandTool工具查询。客户询问的车型信息，你可以使用saleCarsInfoTool工具查询，
当客户询问的车型名称不完全与工具查询的一致，你需要从查询结果中提取车型名称，然后与客户确认。
其他需要传入‘车型名称’参数的工具，你需要完全按照从工具查询结果中提取的车型名称传入。
用户的问题可能是：
1. 你们店有哪些汽车品牌？
2. 你们店有哪些汽车型号？
3. 你们店有哪些汽车价格？
4. 你们店有哪些汽车颜色？
5. 你们店有哪些汽车配置？
6. 你们店有哪些汽车优惠政策？";

pub const PLACE_ORDER_APPROVAL_NOTE: &str = "下单操作需要人工审批";

/// The showroom tool set; ordering requires human approval.
pub fn build_registry() -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(AccountInfoTool)?;
    registry.register(CarBrandTool)?;
    registry.register(SaleCarsInfoTool)?;
    registry.register_protected(PlaceOrderTool, Some(PLACE_ORDER_APPROVAL_NOTE))?;
    Ok(registry)
}

pub fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ThreadStore>> {
    match config.storage.thread_store.as_str() {
        "memory" => Ok(Arc::new(MemoryThreadStore::new())),
        "file" => Ok(Arc::new(FileThreadStore::new(&config.storage.data_dir)?)),
        other => anyhow::bail!("unknown THREAD_STORE backend: {other}"),
    }
}

/// Assemble the service around an already-built provider.
pub fn assemble(
    config: &Config,
    provider: Arc<dyn ToolAwareLlmProvider>,
    store: Arc<dyn ThreadStore>,
) -> anyhow::Result<AgentService> {
    let registry = Arc::new(build_registry()?);
    info!(tools = registry.len(), store = store.store_name(), "tool registry ready");

    let settings = ExecutorSettings {
        system_prompt: Some(SYSTEM_PROMPT.to_string()),
        max_iterations: config.agent.max_iterations,
        context_window_tokens: config.agent.context_window_tokens,
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
    };
    let executor = TurnExecutor::new(provider, registry, store)
        .with_settings(settings)
        .with_interceptor(Arc::new(ContentFilter::new(config.agent.blocked_words.clone())))
        .with_interceptor(Arc::new(ModelTimingLogger));

    if config.agent.auto_approve {
        warn!("AGENT_AUTO_APPROVE is set: protected tool calls run without an approver");
    }
    let controller = InterruptionController::new().with_auto_approve(config.agent.auto_approve);

    Ok(AgentService::new(executor, controller)
        .with_agent_name(config.agent.name.clone())
        .with_stream_timeout(Duration::from_secs(config.agent.stream_timeout_secs)))
}

/// Build the agent service, or `None` when no LLM provider is configured.
pub fn build_service(config: &Config) -> anyhow::Result<Option<AgentService>> {
    if !config.llm.is_configured() {
        warn!(provider = %config.llm.provider, "LLM provider not configured; agent endpoints disabled");
        return Ok(None);
    }
    let provider = showroom_llm::create_provider(&config.llm)?;
    let store = build_store(config)?;
    Ok(Some(assemble(config, provider, store)?))
}
