//! Shared application state handed to every handler.

use showroom_agent::AgentService;
use showroom_core::Config;

pub struct AppState {
    pub config: Config,
    /// `None` when no LLM provider is configured; agent routes answer 503.
    pub service: Option<AgentService>,
}

impl AppState {
    pub fn new(config: Config, service: Option<AgentService>) -> Self {
        Self { config, service }
    }
}
