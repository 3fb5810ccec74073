use serde::Serialize;

/// Structured lifecycle events emitted as JSON via `tracing::info!`, one
/// variant per noteworthy thing happening outside the SSE event stream
/// itself (SSE events are user-facing; trace events are operator-facing).
#[derive(Debug, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionAdmitted {
        session_id: String,
    },
    SessionCompleted {
        session_id: String,
        rounds: u32,
        duration_ms: u64,
    },
    AdmissionTimedOut,
    RoundStarted {
        session_id: String,
        round: u32,
    },
    RoundEnded {
        session_id: String,
        round: u32,
        tool_calls: usize,
    },
    ToolDispatched {
        session_id: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    CitationStored {
        session_id: String,
        citation_id: String,
    },
    CitationEvicted {
        session_id: String,
        citation_id: String,
    },
    ClassifierFallback {
        session_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ea_event");
    }
}
