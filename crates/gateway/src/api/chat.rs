//! `POST /chat/stream` — the one entry point into the reasoning loop.
//!
//! Grounded on the teacher's `api/chat.rs::chat_stream`/`make_sse_stream`:
//! a pre-flight admission check, session-store bookkeeping, spawning the
//! turn, and wrapping the event channel's receiver in an SSE stream whose
//! `Drop` releases the admission slot. The teacher's session-exclusivity
//! lock (429 on contention) is replaced here by the global, bounded-wait
//! admission semaphore and its in-band `busy` event per spec.md §4.4.1,
//! since this spec's timeout path is an HTTP 200 with a synthetic event
//! pair rather than a rejected request.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use uuid::Uuid;

use ea_domain::cancel::CancellationContext;
use ea_domain::trace::TraceEvent;
use ea_llm::GenerationConfig;
use ea_orchestrator::{EventKind, OrchestratorDeps, StreamEvent};
use ea_sessions::{SessionEntry, SessionStatus};
use ea_tools::ToolContext;

use crate::state::AppState;
use crate::terminal_guard::TerminalGuard;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Accepted for forward compatibility with clients that already track
    /// a session id client-side; the gateway always mints its own.
    #[serde(default)]
    #[allow(dead_code)]
    pub session_id: Option<String>,
}

fn build_generation_config(template: &GenerationConfig, body: &ChatRequest) -> GenerationConfig {
    let mut config = template.clone();
    if let Some(t) = body.temperature {
        config.temperature = t;
    }
    if let Some(p) = body.top_p {
        config.top_p = p;
    }
    if let Some(p) = body.presence_penalty {
        config.presence_penalty = p;
    }
    if let Some(m) = body.max_tokens {
        config.max_output_tokens = m;
    }
    config
}

pub async fn chat_stream(State(state): State<AppState>, axum::Json(body): axum::Json<ChatRequest>) -> impl IntoResponse {
    let session_id = Uuid::new_v4();

    let permit = match state.admission.acquire().await {
        Some(permit) => permit,
        None => {
            TraceEvent::AdmissionTimedOut.emit();
            return Sse::new(busy_stream(session_id)).keep_alive(KeepAlive::default()).into_response();
        }
    };

    let generation_config = build_generation_config(&state.generation_config_template, &body);
    let cancellation = CancellationContext::new(state.request_wall_clock);

    state.sessions.insert(SessionEntry::new(session_id, body.question.clone(), cancellation.clone()));
    state.sessions.update(session_id, |entry| entry.status = SessionStatus::Processing);
    TraceEvent::SessionAdmitted { session_id: session_id.to_string() }.emit();

    let tool_ctx = ToolContext {
        retrieval: state.retrieval.clone(),
        llm: state.llm.clone(),
        judge_generation_config: state.judge_generation_config_template.clone(),
        exec_timeout: state.exec_timeout,
        exec_output_cap_chars: state.exec_output_cap_chars,
        session_id: session_id.to_string(),
    };

    let deps = OrchestratorDeps {
        llm: state.llm.clone(),
        tool_ctx,
        citations: state.citations.clone(),
        generation_config,
        judge_generation_config: state.judge_generation_config_template.clone(),
        system_prompt: state.system_prompt.clone(),
        max_rounds: state.max_rounds,
        token_budget: state.token_budget,
    };

    let orchestrator_rx = ea_orchestrator::run(deps, session_id, body.question.clone(), cancellation.clone());

    let (out_tx, out_rx) = mpsc::channel(128);
    let sessions = state.sessions.clone();

    tokio::spawn(async move {
        let guard_tx = out_tx.clone();
        let mut guard = TerminalGuard::new(guard_tx, session_id.to_string());
        let mut rx = orchestrator_rx;
        while let Some(ev) = rx.recv().await {
            if let Some(status) = terminal_status_for(&ev.kind) {
                sessions.mark_terminal(session_id, status);
            }
            let completed = matches!(ev.kind, EventKind::Completed);
            if out_tx.send(ev).await.is_err() {
                break;
            }
            if completed {
                guard.disarm();
                break;
            }
        }
    });

    let stream = make_sse_stream(out_rx, permit, cancellation);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn terminal_status_for(kind: &EventKind) -> Option<SessionStatus> {
    match kind {
        EventKind::FinalAnswer { .. } | EventKind::NoAnswer => Some(SessionStatus::Completed),
        EventKind::Cancelled => Some(SessionStatus::Cancelled),
        EventKind::Timeout => Some(SessionStatus::TimedOut),
        EventKind::Error => Some(SessionStatus::Failed),
        _ => None,
    }
}

/// Cancels the session's [`CancellationContext`] when dropped, so a
/// client disconnect (which drops the SSE stream's generator future) is
/// observed by the orchestrator at its next checkpoint.
struct CancelOnDrop(CancellationContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn make_sse_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
    permit: OwnedSemaphorePermit,
    cancellation: CancellationContext,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        // Held for the generator's lifetime: dropping it (client
        // disconnect) releases the admission slot and flips the
        // cancellation flag, same technique as the teacher's `_permit`
        // held inside `make_sse_stream`.
        let _permit = permit;
        let _cancel_guard = CancelOnDrop(cancellation);

        while let Some(ev) = rx.recv().await {
            let json = serde_json::to_value(&ev).unwrap_or_default();
            let event_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("message").to_string();
            let data = serde_json::to_string(&json).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}

/// The synthetic `{error, completed}` pair emitted in-band when admission
/// times out waiting for a free slot (spec.md §4.4.1/§8 property 8): HTTP
/// 200, no slot held, nothing to release.
fn busy_stream(session_id: Uuid) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let error = StreamEvent::new(EventKind::Error, "server busy: no admission slot available", session_id.to_string());
        yield Ok(sse_event(&error));
        let completed = StreamEvent::new(EventKind::Completed, "", session_id.to_string());
        yield Ok(sse_event(&completed));
    }
}

fn sse_event(ev: &StreamEvent) -> Event {
    let json = serde_json::to_value(ev).unwrap_or_default();
    let event_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("message").to_string();
    let data = serde_json::to_string(&json).unwrap_or_default();
    Event::default().event(event_type).data(data)
}
