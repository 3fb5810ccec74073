use std::sync::Arc;
use std::time::Duration;

use ea_domain::message::ToolCall;
use ea_domain::{CancellationContext, Error, EvidenceRecord, Result};
use ea_llm::{GenerationConfig, LlmClient};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::exec;
use crate::judge::{self, Judgment};
use crate::retrieval::RetrievalClient;

/// Everything a dispatched tool call might need, built once per request
/// and shared across every round (per-request isolation: the orchestrator
/// owns one of these, never shared across requests).
pub struct ToolContext {
    pub retrieval: Arc<RetrievalClient>,
    pub llm: Arc<dyn LlmClient>,
    pub judge_generation_config: GenerationConfig,
    pub exec_timeout: Duration,
    pub exec_output_cap_chars: usize,
    pub session_id: String,
}

/// Result of one `dispatch()` call: a human-readable summary (placed into
/// the transcript's `tool`-role entry and the `tool_result` event) plus
/// any evidence gathered, for the orchestrator to carry forward.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub summary: String,
    pub evidence: Vec<EvidenceRecord>,
    /// Set when cancellation was observed before any side effect was
    /// issued; the orchestrator treats this as an empty observation.
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
struct KnowledgeRetrievalArgs {
    query: String,
    #[serde(default)]
    dataset_ids: Option<Vec<String>>,
    #[serde(default)]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CodeExecutionArgs {
    code: String,
    language: String,
}

/// Dispatch a parsed tool call. Unknown tool names and schema violations
/// fail with `UnknownTool`/`BadToolArgs`; everything else that can go
/// wrong at the tool boundary is a recoverable `ToolExecutionError`.
pub async fn dispatch(
    call: &ToolCall,
    ctx: &ToolContext,
    cancellation: &CancellationContext,
) -> Result<DispatchOutcome> {
    if cancellation.is_cancelled() {
        return Ok(DispatchOutcome {
            summary: "cancelled before dispatch".into(),
            evidence: Vec::new(),
            cancelled: true,
        });
    }

    match call.tool_name.as_str() {
        "knowledge_retrieval" => dispatch_knowledge_retrieval(call, ctx).await,
        "code_execution" => dispatch_code_execution(call, ctx, cancellation).await,
        "judge_sufficiency" => dispatch_judge_sufficiency(call, ctx, cancellation).await,
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

async fn dispatch_knowledge_retrieval(call: &ToolCall, ctx: &ToolContext) -> Result<DispatchOutcome> {
    let args: KnowledgeRetrievalArgs =
        serde_json::from_value(call.arguments.clone()).map_err(|e| Error::BadToolArgs {
            tool: "knowledge_retrieval".into(),
            message: e.to_string(),
        })?;

    let evidence = ctx
        .retrieval
        .retrieve(&args.query, args.dataset_ids, args.top_k, &ctx.session_id)
        .await?;

    let summary = if evidence.is_empty() {
        format!("No evidence found for query \"{}\".", args.query)
    } else {
        let lines: Vec<String> = evidence
            .iter()
            .map(|e| format!("[{}] {}: {}", e.id, e.title, e.preview()))
            .collect();
        format!("Found {} result(s):\n{}", evidence.len(), lines.join("\n"))
    };

    Ok(DispatchOutcome {
        summary,
        evidence,
        cancelled: false,
    })
}

async fn dispatch_code_execution(
    call: &ToolCall,
    ctx: &ToolContext,
    cancellation: &CancellationContext,
) -> Result<DispatchOutcome> {
    let args: CodeExecutionArgs =
        serde_json::from_value(call.arguments.clone()).map_err(|e| Error::BadToolArgs {
            tool: "code_execution".into(),
            message: e.to_string(),
        })?;

    if args.language != "python" {
        return Err(Error::BadToolArgs {
            tool: "code_execution".into(),
            message: format!("unsupported language: {}", args.language),
        });
    }

    let result = exec::execute(&args.code, ctx.exec_timeout, ctx.exec_output_cap_chars, cancellation).await?;

    let mut summary = String::new();
    if result.timed_out {
        summary.push_str("[execution timed out]\n");
    }
    if !result.stdout.is_empty() {
        summary.push_str("stdout:\n");
        summary.push_str(&result.stdout);
        summary.push('\n');
    }
    if !result.stderr.is_empty() {
        summary.push_str("stderr:\n");
        summary.push_str(&result.stderr);
        summary.push('\n');
    }
    if let Some(code) = result.exit_code {
        summary.push_str(&format!("exit code: {code}\n"));
    }
    if result.truncated {
        summary.push_str("[output truncated]\n");
    }
    if summary.is_empty() {
        summary.push_str("(no output)");
    }

    Ok(DispatchOutcome {
        summary,
        evidence: Vec::new(),
        cancelled: false,
    })
}

/// Non-streaming path for an explicitly model-issued `judge_sufficiency`
/// tool call. The orchestrator's own JUDGING phase does not go through
/// this function — it streams the same underlying call directly so it can
/// emit `judgment_streaming` events per delta.
async fn dispatch_judge_sufficiency(
    call: &ToolCall,
    ctx: &ToolContext,
    cancellation: &CancellationContext,
) -> Result<DispatchOutcome> {
    let (question, evidence) = judge::parse_judge_args(&call.arguments)?;
    let judgment = run_judge_non_streaming(ctx.llm.as_ref(), &ctx.judge_generation_config, &question, &evidence, cancellation)
        .await?;

    Ok(DispatchOutcome {
        summary: serde_json::to_string(&judgment).unwrap_or_default(),
        evidence: Vec::new(),
        cancelled: false,
    })
}

/// Issue one judge call and accumulate its stream into a single
/// [`Judgment`], without emitting any intermediate events.
pub async fn run_judge_non_streaming(
    llm: &dyn LlmClient,
    config: &GenerationConfig,
    question: &str,
    evidence: &[EvidenceRecord],
    cancellation: &CancellationContext,
) -> Result<Judgment> {
    let messages = judge::build_judge_messages(question, evidence);
    let mut stream = llm.stream_chat(&messages, config).await?;
    let mut buf = String::new();

    while let Some(delta) = stream.next().await {
        if cancellation.is_cancelled() {
            return Err(Error::JudgeFailure("cancelled mid-judgment".into()));
        }
        match delta {
            ea_domain::stream::Delta::Content(c) => buf.push_str(&c),
            ea_domain::stream::Delta::Done(_) => break,
            ea_domain::stream::Delta::Error(e) => return Err(Error::JudgeFailure(e)),
        }
    }

    judge::parse_judgment(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ea_domain::message::Message;
    use ea_llm::BoxStream;

    struct NeverCalledLlm;

    #[async_trait::async_trait]
    impl LlmClient for NeverCalledLlm {
        async fn stream_chat(&self, _messages: &[Message], _config: &GenerationConfig) -> Result<BoxStream<'static, ea_domain::stream::Delta>> {
            panic!("unknown-tool dispatch should never reach the LLM client")
        }
    }

    fn test_ctx() -> ToolContext {
        ToolContext {
            retrieval: Arc::new(RetrievalClient::new("http://127.0.0.1:1", "http://127.0.0.1:1")),
            llm: Arc::new(NeverCalledLlm),
            judge_generation_config: GenerationConfig {
                model: "test".into(),
                temperature: 0.0,
                top_p: 1.0,
                presence_penalty: 0.0,
                max_output_tokens: 16,
                stop_tokens: Vec::new(),
            },
            exec_timeout: Duration::from_secs(1),
            exec_output_cap_chars: 1000,
            session_id: "s1".into(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let call = ToolCall {
            call_id: "1".into(),
            tool_name: "delete_everything".into(),
            arguments: Value::Null,
        };
        let ctx = test_ctx();
        let result = dispatch(&call, &ctx, &CancellationContext::no_deadline()).await;
        assert!(matches!(result, Err(Error::UnknownTool(name)) if name == "delete_everything"));
    }

    #[tokio::test]
    async fn bad_args_are_rejected() {
        let call = ToolCall {
            call_id: "1".into(),
            tool_name: "code_execution".into(),
            arguments: serde_json::json!({ "code": "print(1)", "language": "ruby" }),
        };
        let ctx = test_ctx();
        let result = dispatch(&call, &ctx, &CancellationContext::no_deadline()).await;
        assert!(matches!(result, Err(Error::BadToolArgs { .. })));
    }

    #[tokio::test]
    async fn cancelled_before_dispatch_short_circuits() {
        let call = ToolCall {
            call_id: "1".into(),
            tool_name: "knowledge_retrieval".into(),
            arguments: serde_json::json!({ "query": "q" }),
        };
        let ctx = test_ctx();
        let cancellation = CancellationContext::no_deadline();
        cancellation.cancel();
        let outcome = dispatch(&call, &ctx, &cancellation).await.unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.evidence.is_empty());
    }
}
