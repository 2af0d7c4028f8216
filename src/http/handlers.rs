//! HTTP request handlers
//!
//! Implements the playlist and segment endpoints plus health/version.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::HlsError;
use crate::segment::{init_file_name, SegmentContainer};
use crate::state::AppState;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            HttpError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, body).into_response()
    }
}

impl From<HlsError> for HttpError {
    fn from(err: HlsError) -> Self {
        match err {
            HlsError::SourceUnavailable(_)
            | HlsError::SessionNotFound(_)
            | HlsError::SegmentNotFound { .. } => HttpError::NotFound(err.to_string()),
            HlsError::InvalidRequest(_) => HttpError::BadRequest(err.to_string()),
            HlsError::TooManySessions(_) | HlsError::ShuttingDown => {
                HttpError::Unavailable(err.to_string())
            }
            _ => HttpError::InternalError(err.to_string()),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("hls-transcoder v", env!("CARGO_PKG_VERSION"))
}

/// Query carried by every playlist and segment URI
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// A file name under `/hls/`, resolved against a session's stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HlsFile {
    Playlist,
    Init,
    Segment(u32),
}

impl HlsFile {
    /// Classify `file` for a session writing `<stem><n>.<ext>` segments
    pub fn parse(file: &str, stem: &str, container: SegmentContainer) -> Option<Self> {
        if file == format!("{}.m3u8", stem) {
            return Some(HlsFile::Playlist);
        }
        if container.has_init_segment() && file == init_file_name(stem, container) {
            return Some(HlsFile::Init);
        }

        let digits = file
            .strip_prefix(stem)?
            .strip_suffix(container.extension())?
            .strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(HlsFile::Segment)
    }
}

/// Playlist, init segment or media segment of a session
/// GET /hls/{file}?token=...
pub async fn hls_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, HttpError> {
    let session = state
        .orchestrator
        .session(&query.token)
        .ok_or_else(|| HlsError::SessionNotFound(query.token.clone()))?;
    let stem = session.media_ref_id.as_str();
    let container = session.container;

    let kind = HlsFile::parse(&file, stem, container)
        .ok_or_else(|| HttpError::NotFound(format!("Unknown file: {}", file)))?;

    match kind {
        HlsFile::Playlist => {
            let playlist = state.playlist(&query.token, stem)?;

            let mut headers = HeaderMap::new();
            headers.insert(
                "Content-Type",
                HeaderValue::from_static("application/vnd.apple.mpegurl"),
            );
            headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));

            Ok((headers, playlist).into_response())
        }
        HlsFile::Init => {
            let path = state.init_segment_path(&query.token, stem)?;
            let data = read_segment(&path).await?;
            Ok(segment_response(container, data))
        }
        HlsFile::Segment(index) => {
            let path = state.request_segment(&query.token, stem, index).await?;
            let data = read_segment(&path).await?;
            Ok(segment_response(container, data))
        }
    }
}

async fn read_segment(path: &std::path::Path) -> Result<Bytes, HttpError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HttpError::NotFound(format!(
            "Segment file missing: {}",
            path.display()
        ))),
        Err(e) => Err(HttpError::InternalError(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn segment_response(container: SegmentContainer, data: Bytes) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static(container.mime_type()),
    );
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("public, max-age=3600"),
    );

    (headers, data).into_response()
}
