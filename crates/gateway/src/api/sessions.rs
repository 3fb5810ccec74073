//! `GET /sessions` and the additive `GET /sessions/{id}`, grounded on the
//! teacher's `api/sessions.rs::list_sessions` shape: a thin handler over
//! the session store's own snapshot methods.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use crate::state::AppState;

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.snapshot_all();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.sessions.snapshot_one(id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "session not found" }))).into_response(),
    }
}
