//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the session and HLS endpoints
//! - Session management (open, list, inspect, close)
//! - Playlist and segment handlers (Content-Type, Cache-Control)
//! - CORS middleware

pub mod handlers;
pub mod routes;
pub mod sessions;

pub use routes::create_router;
