pub mod chat;
pub mod citation;
pub mod health;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full HTTP surface: exactly the four endpoints spec.md §6.1
/// names plus the additive `GET /sessions/{id}` lookup (see `DESIGN.md`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/stream", post(chat::chat_stream))
        .route("/citation/:id", get(citation::get_citation))
        .route("/health", get(health::health))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
}
