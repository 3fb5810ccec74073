//! Tool registry and dispatcher: `knowledge_retrieval`, `code_execution`,
//! and `judge_sufficiency`.

pub mod dispatch;
pub mod exec;
pub mod judge;
pub mod output_buffer;
pub mod retrieval;

pub use dispatch::{dispatch, run_judge_non_streaming, DispatchOutcome, ToolContext};
