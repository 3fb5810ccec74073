//! C5: a process-wide mapping from session ID to citation ID to
//! `{title, full_content}`, written once per citation at final-answer
//! time and read back via a separate HTTP endpoint.

pub mod store;

pub use store::{CitationRecord, CitationStore};
