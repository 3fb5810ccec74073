//! The round state machine: `INIT -> THINKING -> (TOOL_CALLING -> OBSERVING
//! -> JUDGING ->)* (ANSWERING | NO_ANSWER) -> DONE`, with `CANCELLED`,
//! `TIMED_OUT` and `FAILED` reachable from any non-terminal state.
//!
//! Grounded on the teacher's `run_turn`/`run_turn_inner` loop shape in
//! `runtime/turn.rs`: a bounded round loop, an `mpsc::channel` of typed
//! events handed back to the caller, and cancellation checked at loop entry
//! and after every received delta.

use std::sync::Arc;

use ea_citations::CitationStore;
use ea_domain::message::{Message, ToolCall};
use ea_domain::stream::Delta;
use ea_domain::trace::TraceEvent;
use ea_domain::{CancellationContext, CheckpointResult, Citation, EvidenceRecord};
use ea_llm::{GenerationConfig, LlmClient};
use ea_tools::judge::{self, Judgment};
use ea_tools::ToolContext;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{AnswerData, EventKind, StreamEvent};
use crate::tool_call_parser::ToolCallParser;

/// Crude chars-per-token estimate for the running token budget, matching
/// the `CHARS_PER_TOKEN` heuristic the teacher's department classifier
/// uses for its own rough sizing.
const CHARS_PER_TOKEN: usize = 4;

fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() / CHARS_PER_TOKEN).max(1)) as u64
}

const ANSWER_SYSTEM_PROMPT: &str = "You are a medical evidence-grounded question-answering \
assistant. Using only the evidence gathered so far, write a final answer to the user's question. \
Cite evidence inline using bracketed ids that match the evidence list, e.g. [3]. Do not invent \
citations for evidence that was not provided.";

/// Everything one orchestrator run needs, built once per admitted request.
pub struct OrchestratorDeps {
    pub llm: Arc<dyn LlmClient>,
    pub tool_ctx: ToolContext,
    pub citations: Arc<CitationStore>,
    pub generation_config: GenerationConfig,
    pub judge_generation_config: GenerationConfig,
    pub system_prompt: String,
    pub max_rounds: u32,
    pub token_budget: u64,
}

/// How the round loop concluded, before the terminal event is chosen.
enum Conclusion {
    Answer,
    NoAnswer,
}

/// A non-recoverable stop: the round loop unwinds straight to the matching
/// terminal event without running `ANSWERING`.
enum Stop {
    Cancelled,
    TimedOut,
    Error(String),
}

impl From<CheckpointResult> for Option<Stop> {
    fn from(value: CheckpointResult) -> Self {
        match value {
            CheckpointResult::Continue => None,
            CheckpointResult::Cancelled => Some(Stop::Cancelled),
            CheckpointResult::TimedOut => Some(Stop::TimedOut),
        }
    }
}

/// Spawn one orchestrator run and return the receiving half of its event
/// channel. The task runs to completion (always emitting a terminal event
/// followed by exactly one `completed`) even if the receiver is dropped.
pub fn run(deps: OrchestratorDeps, session_id: Uuid, question: String, cancellation: CancellationContext) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(128);
    tokio::spawn(async move {
        run_inner(deps, session_id, question, cancellation, tx).await;
    });
    rx
}

async fn send(tx: &mpsc::Sender<StreamEvent>, session_id: &str, kind: EventKind, content: impl Into<String>) {
    let _ = tx.send(StreamEvent::new(kind, content, session_id.to_string())).await;
}

async fn run_inner(deps: OrchestratorDeps, session_id: Uuid, question: String, cancellation: CancellationContext, tx: mpsc::Sender<StreamEvent>) {
    let sid = session_id.to_string();
    let started = std::time::Instant::now();
    send(&tx, &sid, EventKind::Init, "session admitted").await;

    let mut transcript = vec![Message::system(deps.system_prompt.clone()), Message::user(question.clone())];
    let mut evidence: Vec<EvidenceRecord> = Vec::new();
    let mut round: u32 = 0;
    let mut consumed_tokens: u64 = 0;

    let outcome: Result<Conclusion, Stop> = 'rounds: loop {
        if let Some(stop) = Option::<Stop>::from(cancellation.checkpoint()) {
            break Err(stop);
        }

        if round >= deps.max_rounds {
            break Ok(Conclusion::NoAnswer);
        }
        round += 1;
        TraceEvent::RoundStarted { session_id: sid.clone(), round }.emit();
        send(&tx, &sid, EventKind::RoundStart { round }, format!("round {round} started")).await;
        send(&tx, &sid, EventKind::ThinkingStart, "thinking").await;

        let think = match think_round(&deps, &tx, &sid, &transcript, &cancellation, &mut consumed_tokens).await {
            Ok(t) => t,
            Err(stop) => break Err(stop),
        };

        if think.budget_exceeded {
            send(&tx, &sid, EventKind::TokenLimit, "token budget exhausted, answering with current evidence").await;
            if !think.plain_text.trim().is_empty() {
                transcript.push(Message::assistant(think.plain_text.clone()));
            }
            TraceEvent::RoundEnded { session_id: sid.clone(), round, tool_calls: 0 }.emit();
            send(&tx, &sid, EventKind::RoundEnd { round }, format!("round {round} ended")).await;
            break Ok(Conclusion::Answer);
        }

        if let Some(call) = &think.tool_call {
            if !think.plain_text.trim().is_empty() {
                transcript.push(Message::assistant(think.plain_text.clone()));
            }
            match observe_tool_call(&deps, &tx, &sid, call, &cancellation, &mut evidence).await {
                Ok(summary) => transcript.push(Message::tool_result(call.call_id.clone(), summary)),
                Err(stop) => break Err(stop),
            }
        } else if think.tool_call_malformed {
            if !think.plain_text.trim().is_empty() {
                transcript.push(Message::assistant(think.plain_text.clone()));
            }
        } else if think.plain_text.trim().is_empty() {
            TraceEvent::RoundEnded { session_id: sid.clone(), round, tool_calls: 0 }.emit();
            send(&tx, &sid, EventKind::RoundEnd { round }, format!("round {round} produced no usable content")).await;
            continue 'rounds;
        } else {
            transcript.push(Message::assistant(think.plain_text.clone()));
        }

        TraceEvent::RoundEnded { session_id: sid.clone(), round, tool_calls: think.tool_call.is_some() as usize }.emit();
        send(&tx, &sid, EventKind::RoundEnd { round }, format!("round {round} ended")).await;

        let judgment = match judge_round(&deps, &tx, &sid, &question, &evidence, &cancellation).await {
            Ok(j) => j,
            Err(stop) => break Err(stop),
        };

        if judgment.can_answer {
            break Ok(Conclusion::Answer);
        }
        if round >= deps.max_rounds {
            // can_answer was already false above: the judge never found the
            // gathered evidence sufficient, regardless of how much was retrieved.
            break Ok(Conclusion::NoAnswer);
        }
        send(&tx, &sid, EventKind::ContinueReasoning, judgment.reason.clone()).await;
    };

    match outcome {
        Ok(Conclusion::Answer) => {
            if let Err(stop) = run_answering(&deps, &tx, &sid, &transcript, &evidence, &cancellation).await {
                finish_stop(&tx, &sid, stop).await;
            }
        }
        Ok(Conclusion::NoAnswer) => {
            send(&tx, &sid, EventKind::NoAnswer, "unable to answer within the round budget").await;
        }
        Err(stop) => finish_stop(&tx, &sid, stop).await,
    }

    deps.citations.mark_session_terminal(&sid);
    TraceEvent::SessionCompleted { session_id: sid.clone(), rounds: round, duration_ms: started.elapsed().as_millis() as u64 }.emit();
    send(&tx, &sid, EventKind::Completed, "stream complete").await;
}

async fn finish_stop(tx: &mpsc::Sender<StreamEvent>, session_id: &str, stop: Stop) {
    match stop {
        Stop::Cancelled => send(tx, session_id, EventKind::Cancelled, "request cancelled").await,
        Stop::TimedOut => send(tx, session_id, EventKind::Timeout, "wall-clock budget exceeded").await,
        Stop::Error(msg) => send(tx, session_id, EventKind::Error, msg).await,
    }
}

/// Outcome of one `THINKING` pass.
struct ThinkOutcome {
    plain_text: String,
    tool_call: Option<ToolCall>,
    /// A `<tool_call>` tag opened but never validly closed/parsed.
    tool_call_malformed: bool,
    budget_exceeded: bool,
}

async fn think_round(
    deps: &OrchestratorDeps,
    tx: &mpsc::Sender<StreamEvent>,
    session_id: &str,
    transcript: &[Message],
    cancellation: &CancellationContext,
    consumed_tokens: &mut u64,
) -> Result<ThinkOutcome, Stop> {
    let mut stream = deps
        .llm
        .stream_chat(transcript, &deps.generation_config)
        .await
        .map_err(|e| Stop::Error(e.to_string()))?;

    let mut parser = ToolCallParser::new();
    let mut tool_call_interior: Option<String> = None;

    while let Some(delta) = stream.next().await {
        if let Some(stop) = Option::<Stop>::from(cancellation.checkpoint()) {
            return Err(stop);
        }
        match delta {
            Delta::Content(text) => {
                *consumed_tokens += estimate_tokens(&text);
                match parser.feed(&text) {
                    Some(interior) => {
                        tool_call_interior = Some(interior);
                        break;
                    }
                    None => {
                        if !parser.is_inside_tag() {
                            send(tx, session_id, EventKind::Thinking, text).await;
                        }
                    }
                }
            }
            Delta::Done(_) => break,
            Delta::Error(e) => return Err(Stop::Error(e)),
        }
        if *consumed_tokens >= deps.token_budget {
            break;
        }
    }

    let budget_exceeded = *consumed_tokens >= deps.token_budget;

    let (tool_call, tool_call_malformed) = match tool_call_interior {
        Some(interior) => match parse_tool_call(&interior) {
            Some(call) => (Some(call), false),
            None => {
                send(tx, session_id, EventKind::ToolError, format!("malformed tool call body: {}", truncate(&interior, 200))).await;
                (None, true)
            }
        },
        None if parser.is_inside_tag() => {
            send(tx, session_id, EventKind::ToolError, "tool call tag never closed").await;
            (None, true)
        }
        None => (None, false),
    };

    Ok(ThinkOutcome {
        plain_text: parser.plain_text().to_string(),
        tool_call,
        tool_call_malformed,
        budget_exceeded,
    })
}

fn parse_tool_call(interior: &str) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(interior).ok()?;
    let tool_name = value.get("name").and_then(serde_json::Value::as_str)?.to_string();
    let arguments = value.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall {
        call_id: Uuid::new_v4().to_string(),
        tool_name,
        arguments,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    let truncated: String = text.chars().take(max_chars).collect();
    if truncated.len() < text.len() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

async fn observe_tool_call(
    deps: &OrchestratorDeps,
    tx: &mpsc::Sender<StreamEvent>,
    session_id: &str,
    call: &ToolCall,
    cancellation: &CancellationContext,
    evidence: &mut Vec<EvidenceRecord>,
) -> Result<String, Stop> {
    send(tx, session_id, EventKind::ToolCallStart, format!("invoking {}", call.tool_name)).await;
    send(
        tx,
        session_id,
        EventKind::ToolExecution {
            tool_name: call.tool_name.clone(),
            tool_args: call.arguments.clone(),
        },
        format!("running {}", call.tool_name),
    )
    .await;
    if call.tool_name == "code_execution" {
        if let Some(code) = call.arguments.get("code").and_then(serde_json::Value::as_str) {
            send(tx, session_id, EventKind::PythonExecution { code: code.to_string() }, "executing python").await;
        }
    }

    if let Some(stop) = Option::<Stop>::from(cancellation.checkpoint()) {
        return Err(stop);
    }

    let started = std::time::Instant::now();
    let outcome = ea_tools::dispatch(call, &deps.tool_ctx, cancellation).await;
    TraceEvent::ToolDispatched {
        session_id: session_id.to_string(),
        tool_name: call.tool_name.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
        is_error: outcome.is_err(),
    }
    .emit();

    match outcome {
        Ok(outcome) if outcome.cancelled => Err(Stop::Cancelled),
        Ok(outcome) => {
            send(tx, session_id, EventKind::ToolResult { result: outcome.summary.clone() }, outcome.summary.clone()).await;
            evidence.extend(outcome.evidence);
            Ok(outcome.summary)
        }
        Err(e) if e.is_recoverable() => {
            send(tx, session_id, EventKind::ToolError, e.to_string()).await;
            Ok(String::new())
        }
        Err(e) => Err(Stop::Error(e.to_string())),
    }
}

async fn judge_round(
    deps: &OrchestratorDeps,
    tx: &mpsc::Sender<StreamEvent>,
    session_id: &str,
    question: &str,
    evidence: &[EvidenceRecord],
    cancellation: &CancellationContext,
) -> Result<Judgment, Stop> {
    send(tx, session_id, EventKind::RetrievalJudgment, "judging evidence sufficiency").await;

    let messages = judge::build_judge_messages(question, evidence);
    let mut stream = deps
        .llm
        .stream_chat(&messages, &deps.judge_generation_config)
        .await
        .map_err(|e| Stop::Error(e.to_string()))?;

    let mut buf = String::new();
    send(tx, session_id, EventKind::JudgmentStreaming { is_streaming: true }, "").await;
    while let Some(delta) = stream.next().await {
        if let Some(stop) = Option::<Stop>::from(cancellation.checkpoint()) {
            return Err(stop);
        }
        match delta {
            Delta::Content(text) => {
                buf.push_str(&text);
                send(tx, session_id, EventKind::JudgmentStreaming { is_streaming: true }, text).await;
            }
            Delta::Done(_) => break,
            Delta::Error(e) => return Err(Stop::Error(e)),
        }
    }
    send(tx, session_id, EventKind::JudgmentStreaming { is_streaming: false }, "").await;

    let judgment = match judge::parse_judgment(&buf) {
        Ok(j) => j,
        Err(e) => {
            send(tx, session_id, EventKind::ToolError, format!("judge failed: {e}")).await;
            Judgment {
                can_answer: false,
                confidence: 0.0,
                reason: format!("judge failed: {e}"),
                missing_info: None,
            }
        }
    };

    send(tx, session_id, EventKind::JudgmentResult { judgment: judgment.clone() }, judgment.reason.clone()).await;
    Ok(judgment)
}

async fn run_answering(
    deps: &OrchestratorDeps,
    tx: &mpsc::Sender<StreamEvent>,
    session_id: &str,
    transcript: &[Message],
    evidence: &[EvidenceRecord],
    cancellation: &CancellationContext,
) -> Result<(), Stop> {
    send(tx, session_id, EventKind::AnswerGeneration, "generating final answer").await;

    let mut messages = transcript.to_vec();
    messages.push(Message::system(ANSWER_SYSTEM_PROMPT));
    messages.push(Message::user(build_answer_instruction(evidence)));

    let mut stream = deps
        .llm
        .stream_chat(&messages, &deps.generation_config)
        .await
        .map_err(|e| Stop::Error(e.to_string()))?;

    let mut accumulated = String::new();
    while let Some(delta) = stream.next().await {
        if let Some(stop) = Option::<Stop>::from(cancellation.checkpoint()) {
            return Err(stop);
        }
        match delta {
            Delta::Content(text) => {
                accumulated.push_str(&text);
                send(
                    tx,
                    session_id,
                    EventKind::FinalAnswerChunk { accumulated: accumulated.clone(), is_streaming: true },
                    text.clone(),
                )
                .await;
                send(tx, session_id, EventKind::AnswerStreaming { accumulated: accumulated.clone() }, text).await;
            }
            Delta::Done(_) => break,
            Delta::Error(e) => return Err(Stop::Error(e)),
        }
    }

    let citations = assemble_citations(&accumulated, evidence);
    for citation in &citations {
        if let Some(record) = evidence.iter().find(|e| e.id == citation.id) {
            deps.citations.store(session_id, &record.id, record.title.clone(), record.full_content.clone());
        }
    }

    send(
        tx,
        session_id,
        EventKind::FinalAnswer {
            answer_data: AnswerData { answer: accumulated.clone(), citations },
        },
        accumulated,
    )
    .await;
    Ok(())
}

fn build_answer_instruction(evidence: &[EvidenceRecord]) -> String {
    if evidence.is_empty() {
        return "No evidence was gathered. Answer from the conversation so far, without inventing citations.".to_string();
    }
    let lines: Vec<String> = evidence
        .iter()
        .map(|e| format!("[{}] {}: {}", e.id, e.title, e.full_content))
        .collect();
    format!("Evidence available for citation:\n{}", lines.join("\n\n"))
}

/// Scan the assembled answer for `[id]` markers and intersect with the
/// evidence gathered across rounds, per spec.md §4.3.5 — dedup, preserve
/// first-seen order, no regex dependency (none of the pack's crates pull
/// `regex` in for this spec, see `DESIGN.md`).
fn assemble_citations(answer: &str, evidence: &[EvidenceRecord]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations = Vec::new();
    for id in find_bracketed_tokens(answer) {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(record) = evidence.iter().find(|e| e.id == id) {
            citations.push(record.to_citation());
        }
    }
    citations
}

fn find_bracketed_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    for ch in text.chars() {
        match (&mut current, ch) {
            (None, '[') => current = Some(String::new()),
            (Some(buf), ']') => {
                if !buf.is_empty() && buf.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
                    tokens.push(buf.clone());
                }
                current = None;
            }
            (Some(buf), '[') => {
                // a stray `[` inside an unterminated bracket restarts the scan
                buf.clear();
            }
            (Some(buf), c) => buf.push(c),
            (None, _) => {}
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_is_at_least_one_for_nonempty_text() {
        assert_eq!(estimate_tokens("hi"), 1);
        assert!(estimate_tokens(&"a".repeat(40)) >= 10);
    }

    #[test]
    fn parse_tool_call_extracts_name_and_arguments() {
        let call = parse_tool_call(r#"{"name":"knowledge_retrieval","arguments":{"query":"x"}}"#).unwrap();
        assert_eq!(call.tool_name, "knowledge_retrieval");
        assert_eq!(call.arguments["query"], "x");
    }

    #[test]
    fn parse_tool_call_rejects_missing_name() {
        assert!(parse_tool_call(r#"{"arguments":{}}"#).is_none());
    }

    #[test]
    fn find_bracketed_tokens_extracts_ids_in_order() {
        let tokens = find_bracketed_tokens("Metformin is first-line [1]. See also [2] and [1].");
        assert_eq!(tokens, vec!["1".to_string(), "2".to_string(), "1".to_string()]);
    }

    #[test]
    fn find_bracketed_tokens_ignores_non_id_brackets() {
        let tokens = find_bracketed_tokens("a [not an id with spaces] b [3]");
        assert_eq!(tokens, vec!["3".to_string()]);
    }

    #[test]
    fn assemble_citations_dedupes_and_preserves_order() {
        let evidence = vec![
            EvidenceRecord::new("1", "A", "content a"),
            EvidenceRecord::new("2", "B", "content b"),
        ];
        let citations = assemble_citations("See [2] and [1] and [2] again. Unknown [9].", &evidence);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].id, "2");
        assert_eq!(citations[1].id, "1");
    }

    #[test]
    fn truncate_appends_ellipsis_only_when_shortened() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 3), "abc…");
    }
}
