use serde::{Deserialize, Serialize};

/// Token usage reported at the end of an LLM call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single increment from the LLM client's streaming response.
///
/// Deliberately has no notion of tool calls: the backend this client talks
/// to has no native function-calling protocol, so every tool invocation
/// arrives as ordinary text the orchestrator must parse itself.
#[derive(Debug, Clone)]
pub enum Delta {
    Content(String),
    Done(Usage),
    Error(String),
}
