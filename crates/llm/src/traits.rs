use ea_domain::message::Message;
use ea_domain::stream::Delta;
use ea_domain::Result;
use futures_core::Stream;
use std::pin::Pin;

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Per-request generation parameters, deep-copied from a per-process
/// template and overridden per request.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub max_output_tokens: u32,
    pub stop_tokens: Vec<String>,
}

/// A single, opaque, chat-completions-style streaming LLM backend.
///
/// The client never inspects the text it streams back for tool-call
/// structure; it only passes content bytes through. Whatever lives inside
/// `<tool_call>...</tool_call>` markers is the orchestrator's problem.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<BoxStream<'static, Delta>>;
}
