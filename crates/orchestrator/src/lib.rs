//! C3 Reasoning Orchestrator: the bounded think -> act -> observe -> judge
//! loop that turns one admitted question into a cited final answer.

pub mod events;
pub mod tool_call_parser;
pub mod turn;

pub use events::{AnswerData, EventKind, StreamEvent};
pub use tool_call_parser::ToolCallParser;
pub use turn::{run, OrchestratorDeps};
