//! Shared application state, grounded on the teacher's `state.rs` shape
//! (services grouped by concern, each wrapped in an `Arc`) but a fraction
//! of its size: this gateway has no memory/skills/MCP/nodes/schedules
//! surface to carry.

use std::sync::Arc;
use std::time::Duration;

use ea_domain::config::Config;
use ea_citations::CitationStore;
use ea_llm::{GenerationConfig, HttpLlmClient, LlmClient};
use ea_sessions::SessionStore;
use ea_tools::retrieval::RetrievalClient;

use crate::admission::Admission;

#[derive(Clone)]
pub struct AppState {
    // Core services
    pub llm: Arc<dyn LlmClient>,
    pub retrieval: Arc<RetrievalClient>,
    pub sessions: Arc<SessionStore>,
    pub citations: Arc<CitationStore>,

    // Admission control
    pub admission: Admission,

    // Read-only per-process templates, deep-copied per request before any
    // field is overridden (spec.md §4.4.2).
    pub generation_config_template: GenerationConfig,
    pub judge_generation_config_template: GenerationConfig,

    // Orchestrator budgets
    pub max_rounds: u32,
    pub token_budget: u64,
    pub request_wall_clock: Duration,

    // Tool execution limits
    pub exec_timeout: Duration,
    pub exec_output_cap_chars: usize,

    pub system_prompt: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.request_timeout_secs,
        ));
        Self::with_llm(config, llm)
    }

    /// Build state around a caller-supplied LLM client, bypassing the
    /// real HTTP backend. Used by the gateway's HTTP integration tests,
    /// which stub out `LlmClient` rather than dial out over the network.
    pub fn with_llm(config: &Config, llm: Arc<dyn LlmClient>) -> Self {
        let retrieval = Arc::new(RetrievalClient::new(
            config.tools.retrieval_base_url.clone(),
            config.tools.classifier_base_url.clone(),
        ));

        let generation_config_template = GenerationConfig {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            top_p: config.llm.top_p,
            presence_penalty: config.llm.presence_penalty,
            max_output_tokens: config.llm.max_output_tokens,
            stop_tokens: Vec::new(),
        };
        let judge_generation_config_template = GenerationConfig {
            stop_tokens: Vec::new(),
            ..generation_config_template.clone()
        };

        Self {
            llm,
            retrieval,
            sessions: Arc::new(SessionStore::with_retention(Duration::from_secs(config.citations.citation_ttl_seconds))),
            citations: Arc::new(CitationStore::new(Duration::from_secs(config.citations.citation_ttl_seconds))),
            admission: Admission::new(
                config.orchestrator.max_concurrent_requests,
                Duration::from_secs(config.orchestrator.admission_timeout_seconds),
            ),
            generation_config_template,
            judge_generation_config_template,
            max_rounds: config.orchestrator.max_rounds,
            token_budget: config.orchestrator.token_budget,
            request_wall_clock: Duration::from_secs(config.orchestrator.request_wall_clock_seconds),
            exec_timeout: Duration::from_secs(config.tools.exec_timeout_seconds),
            exec_output_cap_chars: config.tools.exec_output_cap_chars,
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are a careful, evidence-grounded reasoning assistant. Use the \
     knowledge_retrieval and code_execution tools as needed, and call \
     judge_sufficiency-style reasoning internally before answering. Never \
     answer without citing retrieved evidence by its bracketed id."
        .to_string()
}
