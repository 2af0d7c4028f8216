//! Axum router configuration

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{health_check, hls_file, version_check};
use super::sessions::{close_session, get_session, list_sessions, open_session};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Session control
        .route("/sessions", get(list_sessions).post(open_session))
        .route("/sessions/{token}", get(get_session).delete(close_session))
        // Playlist, init and media segments
        .route("/hls/{file}", get(hls_file))
        .layer(TraceLayer::new_for_http());

    let router = if state.config.cors_enabled {
        // HLS players fetch segments cross-origin and may send Range
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::DELETE,
                Method::OPTIONS,
                Method::HEAD,
            ])
            .allow_headers([
                header::ACCEPT,
                header::RANGE,
                header::CONTENT_TYPE,
                header::ORIGIN,
            ])
            .max_age(Duration::from_secs(3600));
        router.layer(cors)
    } else {
        router
    };

    router.with_state(state)
}
