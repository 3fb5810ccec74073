use chrono::{DateTime, Utc};
use ea_domain::Citation;
use ea_tools::judge::Judgment;
use serde::Serialize;
use serde_json::Value;

/// The terminal event payload for a successful answer: `spec.md` §4.3.5
/// keeps the citation list out of every streamed chunk and emits it only
/// once, here, on the single terminal `final_answer` event.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerData {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// One SSE event type, exactly the exhaustive taxonomy of spec.md §6.2.
/// `#[serde(tag = "type")]` plus `StreamEvent`'s flattening gives every
/// frame the common `{type, content, timestamp, session_id, ...}` shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Init,
    RoundStart { round: u32 },
    RoundEnd { round: u32 },
    ThinkingStart,
    Thinking,
    ToolCallStart,
    ToolExecution { tool_name: String, tool_args: Value },
    PythonExecution { code: String },
    ToolResult { result: String },
    ToolError,
    RetrievalJudgment,
    JudgmentStreaming { is_streaming: bool },
    JudgmentResult { judgment: Judgment },
    AnswerGeneration,
    ContinueReasoning,
    /// Not named in spec.md §6.2's "exhaustive" type list, but the
    /// transition text in §4.3.2/§4.3.3 explicitly requires emitting this
    /// the instant the token budget forces an early `ANSWERING` — treated
    /// as a minor omission in the taxonomy enumeration, not a directive
    /// to skip it (see `DESIGN.md`).
    TokenLimit,
    FinalAnswerChunk { accumulated: String, is_streaming: bool },
    AnswerStreaming { accumulated: String },
    FinalAnswer { answer_data: AnswerData },
    NoAnswer,
    Timeout,
    Cancelled,
    Error,
    Completed,
}

/// A single streamed frame: `#[serde(flatten)]` merges `kind`'s tagged
/// variant fields with the common envelope fields at the same JSON level.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

impl StreamEvent {
    pub fn new(kind: EventKind, content: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
        }
    }

    /// Whether this event is one of the five terminal event types
    /// (`final_answer`, `no_answer`, `timeout`, `cancelled`, `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::FinalAnswer { .. }
                | EventKind::NoAnswer
                | EventKind::Timeout
                | EventKind::Cancelled
                | EventKind::Error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat_with_type_tag() {
        let ev = StreamEvent::new(EventKind::RoundStart { round: 1 }, "round 1", "s1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "round_start");
        assert_eq!(json["round"], 1);
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["content"], "round 1");
    }

    #[test]
    fn final_answer_is_terminal() {
        let ev = StreamEvent::new(
            EventKind::FinalAnswer {
                answer_data: AnswerData { answer: "a".into(), citations: vec![] },
            },
            "done",
            "s1",
        );
        assert!(ev.is_terminal());
    }

    #[test]
    fn thinking_is_not_terminal() {
        let ev = StreamEvent::new(EventKind::Thinking, "...", "s1");
        assert!(!ev.is_terminal());
    }

    #[test]
    fn judgment_streaming_type_tag_matches_taxonomy() {
        let ev = StreamEvent::new(EventKind::JudgmentStreaming { is_streaming: true }, "", "s1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "judgment_streaming");
    }
}
