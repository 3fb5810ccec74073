use std::time::Duration;

use ea_domain::message::{Message, MessageContent, Role};
use ea_domain::stream::{Delta, Usage};
use ea_domain::{Error, Result};
use serde_json::{json, Value};

use crate::sse::sse_response_stream;
use crate::traits::{BoxStream, GenerationConfig, LlmClient};

/// Speaks the common chat-completions-over-SSE wire format: a JSON body
/// POSTed to `{base_url}/chat/completions` with `"stream": true`, bearer
/// auth, and `data: {json}` / `data: [DONE]` response framing.
pub struct HttpLlmClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client builds with static TLS config");
        Self {
            base_url: base_url.into(),
            api_key,
            client,
        }
    }

    fn build_body(&self, messages: &[Message], config: &GenerationConfig) -> Value {
        let messages: Vec<Value> = messages.iter().map(msg_to_json).collect();
        let mut body = json!({
            "model": config.model,
            "messages": messages,
            "stream": true,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "presence_penalty": config.presence_penalty,
            "max_tokens": config.max_output_tokens,
            "stream_options": { "include_usage": true },
        });
        if !config.stop_tokens.is_empty() {
            body["stop"] = json!(config.stop_tokens);
        }
        body
    }
}

fn msg_to_json(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let MessageContent::Text(text) = &m.content;
    let mut v = json!({ "role": role, "content": text });
    if let Some(id) = &m.tool_call_id {
        v["tool_call_id"] = json!(id);
    }
    v
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn stream_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<BoxStream<'static, Delta>> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(messages, config);

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::BackendUnavailable(e.to_string())
            } else {
                Error::BackendError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::BackendError(format!("{status}: {text}")));
        }

        Ok(sse_response_stream(response, parse_sse_payload))
    }
}

fn parse_sse_payload(data: &str) -> Option<Delta> {
    if data == "[DONE]" {
        return Some(Delta::Done(Usage::default()));
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Delta::Error(format!("malformed backend chunk: {e}"))),
    };

    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        let usage = Usage {
            prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            completion_tokens: usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_tokens: usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
        };
        if value
            .get("choices")
            .and_then(Value::as_array)
            .map(|c| c.is_empty())
            .unwrap_or(true)
        {
            return Some(Delta::Done(usage));
        }
    }

    let choice = value.get("choices").and_then(|c| c.get(0))?;

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        if !reason.is_empty() {
            return Some(Delta::Done(Usage::default()));
        }
    }

    let content = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str);

    content.map(|c| Delta::Content(c.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let payload = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        match parse_sse_payload(payload) {
            Some(Delta::Content(c)) => assert_eq!(c, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_done_sentinel() {
        assert!(matches!(parse_sse_payload("[DONE]"), Some(Delta::Done(_))));
    }

    #[test]
    fn parses_finish_reason_as_done() {
        let payload = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(parse_sse_payload(payload), Some(Delta::Done(_))));
    }

    #[test]
    fn malformed_json_yields_error_delta() {
        assert!(matches!(parse_sse_payload("{not json"), Some(Delta::Error(_))));
    }
}
