use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SHOWROOM_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SHOWROOM_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  storage:     backend={}, data_dir={}",
            self.storage.thread_store,
            self.storage.data_dir.display()
        );
        tracing::info!(
            "  llm:         provider={}, model={}, configured={}",
            self.llm.provider,
            self.llm.model,
            self.llm.is_configured()
        );
        tracing::info!(
            "  agent:       max_iterations={}, stream_timeout={}s, auto_approve={}",
            self.agent.max_iterations,
            self.agent.stream_timeout_secs,
            self.agent.auto_approve
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": {
                "thread_store": self.storage.thread_store,
                "data_dir": self.storage.data_dir,
            },
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.model,
                "base_url": self.llm.base_url,
                "configured": self.llm.is_configured(),
            },
            "agent": {
                "name": self.agent.name,
                "max_iterations": self.agent.max_iterations,
                "stream_timeout_secs": self.agent.stream_timeout_secs,
                "auto_approve": self.agent.auto_approve,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// "file" or "memory"
    pub thread_store: String,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            thread_store: profiled_env_or(p, "THREAD_STORE", "file"),
        }
    }
}

// ── LLM (OpenAI-compatible endpoints) ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "dashscope", "openai"
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        let provider = profiled_env_or(p, "LLM_PROVIDER", "dashscope");
        let default_base_url = match provider.as_str() {
            "openai" => "https://api.openai.com/v1",
            _ => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        };
        let default_model = match provider.as_str() {
            "openai" => "gpt-4o",
            _ => "qwen3-max",
        };
        Self {
            api_key: profiled_env_opt(p, "LLM_API_KEY")
                .or_else(|| profiled_env_opt(p, "DASHSCOPE_API_KEY")),
            model: profiled_env_or(p, "LLM_MODEL", default_model),
            base_url: profiled_env_or(p, "LLM_BASE_URL", default_base_url),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.5")
                .parse()
                .unwrap_or(0.5),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 2000),
            provider,
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "dashscope" | "openai" => self.api_key.is_some(),
            _ => false,
        }
    }
}

// ── Agent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub max_iterations: usize,
    /// Approximate token budget of history sent to the model per step.
    pub context_window_tokens: usize,
    pub stream_timeout_secs: u64,
    /// Development stand-in: approve every protected tool call automatically.
    pub auto_approve: bool,
    pub blocked_words: Vec<String>,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        let blocked_words = profiled_env_or(p, "AGENT_BLOCKED_WORDS", "草泥马,敏感词2,敏感词3")
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            name: profiled_env_or(p, "AGENT_NAME", "hitlAgent"),
            max_iterations: profiled_env_u32(p, "AGENT_MAX_ITERATIONS", 10) as usize,
            context_window_tokens: profiled_env_u32(p, "AGENT_CONTEXT_TOKENS", 8192) as usize,
            stream_timeout_secs: profiled_env_u64(p, "AGENT_STREAM_TIMEOUT_SECS", 300),
            auto_approve: profiled_env_bool(p, "AGENT_AUTO_APPROVE", false),
            blocked_words,
        }
    }
}
