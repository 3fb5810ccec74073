//! Streaming client for the chat-completions-style LLM backend.

mod http_client;
mod sse;
mod traits;

pub use http_client::HttpLlmClient;
pub use traits::{BoxStream, GenerationConfig, LlmClient};
