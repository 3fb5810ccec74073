use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Variants are split into recoverable tool/round-level failures (which
/// the orchestrator converts into an in-stream event and continues past)
/// and non-recoverable failures (which terminate the request with a
/// single `error` event followed by `completed`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("llm backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("llm backend returned an error: {0}")]
    BackendError(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("bad arguments for tool {tool}: {message}")]
    BadToolArgs { tool: String, message: String },

    #[error("tool {tool} failed: {message}")]
    ToolExecutionError { tool: String, message: String },

    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("sufficiency judge failed: {0}")]
    JudgeFailure(String),

    #[error("round/token budget exhausted")]
    BudgetExhausted,

    #[error("request exceeded its wall-clock budget")]
    WallClockTimeout,

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("admission timed out waiting for a free slot")]
    AdmissionTimeout,

    #[error("citation not found: {0}")]
    CitationNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this failure is recoverable at the current round (emit an
    /// in-stream error event and continue) or terminal (end the request).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownTool(_)
                | Error::BadToolArgs { .. }
                | Error::ToolExecutionError { .. }
                | Error::MalformedToolCall(_)
                | Error::JudgeFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
