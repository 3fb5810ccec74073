//! C4 Request Pipeline: the HTTP/SSE surface wrapping the C1-C3
//! reasoning stack plus the C5 citation store.

pub mod admission;
pub mod api;
pub mod config;
pub mod state;
pub mod terminal_guard;
