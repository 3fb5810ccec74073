//! The session half of C4: an in-memory, guarded map from session ID to
//! its current lifecycle state, plus a bounded post-completion retention
//! window so late citation lookups still resolve.

pub mod store;

pub use store::{SessionEntry, SessionSnapshot, SessionState, SessionStatus, SessionStore};
