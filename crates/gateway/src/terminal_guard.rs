//! RAII guarantee that every admitted session's stream ends with exactly
//! one terminal event followed by exactly one `completed` frame, even if
//! the orchestrator task panics or returns early without reaching its own
//! cleanup code.
//!
//! `ea_orchestrator::run` already emits `completed` unconditionally on
//! every code path it controls (see `turn.rs`); this guard only covers
//! the path that code can't: the forwarding task's outbound channel
//! closing because the orchestrator task died before emitting anything.

use ea_orchestrator::{EventKind, StreamEvent};
use tokio::sync::mpsc;

pub struct TerminalGuard {
    tx: mpsc::Sender<StreamEvent>,
    session_id: String,
    satisfied: bool,
}

impl TerminalGuard {
    pub fn new(tx: mpsc::Sender<StreamEvent>, session_id: impl Into<String>) -> Self {
        Self {
            tx,
            session_id: session_id.into(),
            satisfied: false,
        }
    }

    /// Mark the guarantee as met. Call this once a `completed` frame has
    /// actually been forwarded downstream.
    pub fn disarm(&mut self) {
        self.satisfied = true;
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.satisfied {
            return;
        }
        let _ = self.tx.try_send(StreamEvent::new(
            EventKind::Error,
            "internal error: session ended without a terminal event",
            self.session_id.clone(),
        ));
        let _ = self.tx.try_send(StreamEvent::new(EventKind::Completed, "", self.session_id.clone()));
    }
}
