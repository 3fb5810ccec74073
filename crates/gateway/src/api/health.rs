//! `GET /health` — lightweight health probe, public, no auth.
//! Grounded on the teacher's `api/admin.rs::health`, expanded with the
//! admission/session counters spec.md §6.1 requires this endpoint return.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "max_concurrent": state.admission.max_concurrent(),
        "available_slots": state.admission.available_permits(),
        "processing_count": state.sessions.processing_count(),
        "active_sessions": state.sessions.len(),
    }))
}
