//! Shared types for the evidence-grounded reasoning agent gateway.
//!
//! Everything that crosses a crate boundary lives here: the message
//! transcript model, tool-call types, streaming deltas, the error
//! taxonomy, configuration, and structured trace events.

pub mod cancel;
pub mod config;
pub mod error;
pub mod evidence;
pub mod message;
pub mod stream;
pub mod trace;

pub use cancel::{CancellationContext, CheckpointResult};
pub use error::{Error, Result};
pub use evidence::{Citation, EvidenceRecord};
pub use message::{Message, MessageContent, Role, ToolCall};
pub use stream::{Delta, Usage};
