//! HTTP integration tests for the gateway's SSE surface, mirroring the
//! teacher's `crates/providers/tests/router_integration.rs` placement: a
//! crate-level `tests/` file driving real request/response round trips
//! rather than `#[cfg(test)]` unit modules.
//!
//! These stand up the real axum app on an ephemeral local port and stub
//! only the LLM backend (`LlmClient`), so the full request pipeline —
//! admission, the orchestrator's round loop, SSE framing, and the
//! terminal-event guarantee — runs for real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ea_domain::config::Config;
use ea_domain::message::Message;
use ea_domain::stream::{Delta, Usage};
use ea_domain::Result;
use ea_gateway::api;
use ea_gateway::state::AppState;
use ea_llm::{BoxStream, GenerationConfig, LlmClient};
use futures_util::stream;

/// Replies with one canned response per call, in order, regardless of
/// what transcript it was asked to continue. Good enough to drive the
/// orchestrator's think/judge/answer calls deterministically without a
/// real model.
struct StubLlmClient {
    responses: Vec<&'static str>,
    calls: AtomicUsize,
}

impl StubLlmClient {
    fn new(responses: Vec<&'static str>) -> Self {
        Self { responses, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn stream_chat(&self, _messages: &[Message], _config: &GenerationConfig) -> Result<BoxStream<'static, Delta>> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.responses.get(idx).copied().unwrap_or("{}").to_string();
        let items = vec![Delta::Content(text), Delta::Done(Usage::default())];
        Ok(Box::pin(stream::iter(items)))
    }
}

struct NeverCalledLlm;

#[async_trait]
impl LlmClient for NeverCalledLlm {
    async fn stream_chat(&self, _messages: &[Message], _config: &GenerationConfig) -> Result<BoxStream<'static, Delta>> {
        panic!("this test never exercises the orchestrator")
    }
}

async fn spawn_test_server(state: AppState) -> String {
    let app = api::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_sessions_and_citation_surface_respond_before_any_session_exists() {
    let config = Config::default();
    let state = AppState::with_llm(&config, Arc::new(NeverCalledLlm));
    let base = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["active_sessions"], 0);

    let sessions: serde_json::Value = client.get(format!("{base}/sessions")).send().await.unwrap().json().await.unwrap();
    assert_eq!(sessions["count"], 0);

    let citation = client.get(format!("{base}/citation/does-not-exist")).send().await.unwrap();
    assert_eq!(citation.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_stream_happy_path_without_tool_calls_reaches_final_answer() {
    let mut config = Config::default();
    config.orchestrator.max_rounds = 5;

    let responses = vec![
        "The recommended first-line therapy for type 2 diabetes is metformin [1].",
        r#"{"can_answer": true, "confidence": 0.9, "reason": "the answer is directly stated"}"#,
        "The recommended first-line therapy for type 2 diabetes is metformin [1].",
    ];
    let state = AppState::with_llm(&config, Arc::new(StubLlmClient::new(responses)));
    let base = spawn_test_server(state).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({ "question": "What is the recommended first-line therapy for type 2 diabetes?" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body.matches("\"type\":\"final_answer\"").count(), 1, "exactly one terminal final_answer event");
    assert_eq!(body.matches("\"type\":\"completed\"").count(), 1, "exactly one completed event");
    assert!(body.contains("\"type\":\"init\""));
    assert!(body.contains("\"type\":\"round_start\""));
    assert!(body.contains("\"type\":\"judgment_result\""));
}

#[tokio::test]
async fn admission_timeout_yields_in_band_busy_pair_with_http_200() {
    let mut config = Config::default();
    config.orchestrator.max_concurrent_requests = 1;
    config.orchestrator.admission_timeout_seconds = 1;

    let state = AppState::with_llm(&config, Arc::new(NeverCalledLlm));
    // Occupy the only admission slot before any request arrives.
    let held_permit = state.admission.acquire().await.expect("first acquire succeeds");

    let base = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();

    assert_eq!(body.matches("\"type\":\"error\"").count(), 1);
    assert_eq!(body.matches("\"type\":\"completed\"").count(), 1);
    assert!(body.to_lowercase().contains("busy"));

    drop(held_permit);
}

#[tokio::test]
async fn exhausting_rounds_without_sufficient_evidence_ends_in_no_answer() {
    let mut config = Config::default();
    config.orchestrator.max_rounds = 2;

    // Every judge call says evidence is insufficient; the think phase
    // never emits a tool call, so the loop runs out its round budget.
    let responses = vec![
        "I'm still not sure.",
        r#"{"can_answer": false, "confidence": 0.1, "reason": "no evidence gathered"}"#,
        "Still thinking.",
        r#"{"can_answer": false, "confidence": 0.1, "reason": "no evidence gathered"}"#,
    ];
    let state = AppState::with_llm(&config, Arc::new(StubLlmClient::new(responses)));
    let base = spawn_test_server(state).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({ "question": "an unanswerable question" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body.matches("\"type\":\"round_start\"").count(), 2);
    assert_eq!(body.matches("\"type\":\"no_answer\"").count(), 1);
    assert_eq!(body.matches("\"type\":\"completed\"").count(), 1);
}

/// Pins spec scenario S3: retrieval keeps returning snippets, but the
/// judge never finds them sufficient. Non-empty `evidence` must not be
/// mistaken for a sufficient answer when the round budget runs out.
#[tokio::test]
async fn exhausting_rounds_with_irrelevant_evidence_still_ends_in_no_answer() {
    let retrieval_app = axum::Router::new().route(
        "/retrieve",
        axum::routing::post(|| async {
            axum::Json(serde_json::json!({
                "results": [
                    { "id": "99", "title": "Unrelated note", "content": "This does not address the question." }
                ]
            }))
        }),
    );
    let retrieval_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let retrieval_addr = retrieval_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(retrieval_listener, retrieval_app).await.unwrap();
    });

    let mut config = Config::default();
    config.orchestrator.max_rounds = 2;
    config.tools.retrieval_base_url = format!("http://{retrieval_addr}");

    // Every round issues a tool call that returns irrelevant-but-nonempty
    // evidence, and every judge call rejects it as insufficient.
    let tool_call = r#"<tool_call>{"name": "knowledge_retrieval", "arguments": {"query": "an unanswerable question", "dataset_ids": []}}</tool_call>"#;
    let responses = vec![
        tool_call,
        r#"{"can_answer": false, "confidence": 0.1, "reason": "evidence does not address the question"}"#,
        tool_call,
        r#"{"can_answer": false, "confidence": 0.1, "reason": "evidence does not address the question"}"#,
    ];
    let state = AppState::with_llm(&config, Arc::new(StubLlmClient::new(responses)));
    let base = spawn_test_server(state).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({ "question": "an unanswerable question" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body.matches("\"type\":\"round_start\"").count(), 2);
    assert_eq!(body.matches("\"type\":\"no_answer\"").count(), 1, "non-empty evidence must not force final_answer");
    assert_eq!(body.matches("\"type\":\"final_answer\"").count(), 0);
    assert_eq!(body.matches("\"type\":\"completed\"").count(), 1);
}
