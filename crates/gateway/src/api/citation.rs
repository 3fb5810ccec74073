//! `GET /citation/{id}` — resolve a citation id against the session that
//! emitted it. Spec.md §6.1 only names the id in the path, so the citation
//! store is keyed by session; this endpoint scans a session hint when one
//! is supplied as a query parameter, and otherwise leans on the fact that
//! citation ids are unique within the store's currently-live sessions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CitationQuery {
    pub session_id: Option<String>,
}

pub async fn get_citation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<CitationQuery>,
) -> impl IntoResponse {
    if let Some(session_id) = q.session_id {
        return match state.citations.get(&session_id, &id) {
            Ok(record) => Json(serde_json::json!({
                "id": id,
                "full_content": record.full_content,
            }))
            .into_response(),
            Err(_) => not_found(),
        };
    }

    // No session hint: fall back to scanning active sessions for this id,
    // since spec.md's `/citation/{id}` path carries no session context.
    for snapshot in state.sessions.snapshot_all() {
        if let Ok(record) = state.citations.get(&snapshot.id.to_string(), &id) {
            return Json(serde_json::json!({
                "id": id,
                "full_content": record.full_content,
            }))
            .into_response();
        }
    }
    not_found()
}

fn not_found() -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "citation not found" }))).into_response()
}
