//! Session management handlers
//!
//! Handles session opening, listing, inspection and closing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::HttpError;
use crate::error::HlsError;
use crate::state::{AppState, OpenedSession};
use crate::transcode::SessionSnapshot;

/// Request to open a playback session
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    /// Media reference (file stem under the media root)
    pub media_ref_id: String,
    /// Playback position to start at
    pub start_time_secs: Option<f64>,
}

/// List of sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionQuery {
    pub delete_output: Option<bool>,
}

/// Open a session and wait for its startup buffer
/// POST /sessions
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<OpenedSession>), HttpError> {
    let opened = state
        .open_session(&request.media_ref_id, request.start_time_secs)
        .await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

/// List all sessions
/// GET /sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let mut sessions: Vec<_> = state
        .orchestrator
        .sessions()
        .iter()
        .map(|s| s.snapshot())
        .collect();
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// Get session details
/// GET /sessions/{token}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionSnapshot>, HttpError> {
    let session = state
        .orchestrator
        .session(&token)
        .ok_or(HlsError::SessionNotFound(token))?;
    Ok(Json(session.snapshot()))
}

/// Close a session
/// DELETE /sessions/{token}?delete_output=bool
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<CloseSessionQuery>,
) -> Response {
    match state
        .close_session(&token, query.delete_output.unwrap_or(false))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => HttpError::from(e).into_response(),
    }
}
