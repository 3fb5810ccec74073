use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from an optional TOML file and then
/// overlaid by the individual environment variables named below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub citations: CitationsConfig,
}

// ── Server ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

// ── LLM backend ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            presence_penalty: default_presence_penalty(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "default-model".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    1.0
}
fn default_presence_penalty() -> f32 {
    0.0
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_request_timeout_secs() -> u64 {
    120
}

// ── Orchestrator budgets ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_request_wall_clock_seconds")]
    pub request_wall_clock_seconds: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_admission_timeout_seconds")]
    pub admission_timeout_seconds: u64,
    /// Estimated input+output token ceiling per session (spec.md §4.3's
    /// token budget). Not independently named in spec.md §6.3's
    /// configuration list, so it rides on the same env-override
    /// machinery as the other orchestrator knobs under `TOKEN_BUDGET`.
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            request_wall_clock_seconds: default_request_wall_clock_seconds(),
            max_concurrent_requests: default_max_concurrent_requests(),
            admission_timeout_seconds: default_admission_timeout_seconds(),
            token_budget: default_token_budget(),
        }
    }
}

fn default_max_rounds() -> u32 {
    10
}
fn default_request_wall_clock_seconds() -> u64 {
    9000
}
fn default_max_concurrent_requests() -> usize {
    3
}
fn default_admission_timeout_seconds() -> u64 {
    300
}
fn default_token_budget() -> u64 {
    8000
}

// ── Tools ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_retrieval_base_url")]
    pub retrieval_base_url: String,
    #[serde(default = "default_classifier_base_url")]
    pub classifier_base_url: String,
    #[serde(default = "default_exec_timeout_seconds")]
    pub exec_timeout_seconds: u64,
    #[serde(default = "default_exec_output_cap_chars")]
    pub exec_output_cap_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            retrieval_base_url: default_retrieval_base_url(),
            classifier_base_url: default_classifier_base_url(),
            exec_timeout_seconds: default_exec_timeout_seconds(),
            exec_output_cap_chars: default_exec_output_cap_chars(),
        }
    }
}

fn default_retrieval_base_url() -> String {
    "http://localhost:9000".into()
}
fn default_classifier_base_url() -> String {
    "http://localhost:9001".into()
}
fn default_exec_timeout_seconds() -> u64 {
    20
}
fn default_exec_output_cap_chars() -> usize {
    16_000
}

// ── Citations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsConfig {
    #[serde(default = "default_citation_ttl_seconds")]
    pub citation_ttl_seconds: u64,
    #[serde(default = "default_citation_sweep_interval_seconds")]
    pub citation_sweep_interval_seconds: u64,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            citation_ttl_seconds: default_citation_ttl_seconds(),
            citation_sweep_interval_seconds: default_citation_sweep_interval_seconds(),
        }
    }
}

fn default_citation_ttl_seconds() -> u64 {
    3600
}
fn default_citation_sweep_interval_seconds() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tools: ToolsConfig::default(),
            citations: CitationsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults on
    /// any read/parse error.
    pub fn load_or_default(path: &str) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| toml::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Apply the named environment-variable overrides on top of whatever
    /// was loaded from the config file. Unset or unparseable variables
    /// leave the existing value untouched.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(v) = parse_env("MAX_CONCURRENT_REQUESTS") {
            self.orchestrator.max_concurrent_requests = v;
        }
        if let Some(v) = parse_env("MAX_ROUNDS") {
            self.orchestrator.max_rounds = v;
        }
        if let Some(v) = parse_env("REQUEST_WALL_CLOCK_SECONDS") {
            self.orchestrator.request_wall_clock_seconds = v;
        }
        if let Some(v) = parse_env("ADMISSION_TIMEOUT_SECONDS") {
            self.orchestrator.admission_timeout_seconds = v;
        }
        if let Some(v) = parse_env("TOKEN_BUDGET") {
            self.orchestrator.token_budget = v;
        }
        if let Some(v) = parse_env("CITATION_TTL_SECONDS") {
            self.citations.citation_ttl_seconds = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = parse_env("LLM_TEMPERATURE") {
            self.llm.temperature = v;
        }
        if let Some(v) = parse_env("LLM_TOP_P") {
            self.llm.top_p = v;
        }
        if let Some(v) = parse_env("LLM_PRESENCE_PENALTY") {
            self.llm.presence_penalty = v;
        }
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
