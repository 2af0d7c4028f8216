//! HLS Transcode Server
//!
//! Transcodes media files to HLS on demand with ffmpeg. Playback can start
//! at any position; seeks outside the running encode restart it at the
//! requested segment, reusing segments already on disk.

mod config;
mod config_file;
mod error;
mod http;
mod playlist;
mod segment;
mod state;
mod transcode;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::{HlsError, Result};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "hls-transcoder";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("--generate-config") {
        let path = args.next().unwrap_or_else(|| "config.toml".to_string());
        crate::config_file::generate_default_config(&path)
            .map_err(|e| HlsError::Config(format!("failed to write {}: {}", path, e)))?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    // Load configuration
    let config_path = first.unwrap_or_else(|| "config.toml".to_string());
    let (config, load_error) = load_config(&config_path);

    // Initialize logging
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = load_error {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        );
    }
    config.validate()?;
    tracing::info!("Configuration loaded: {:?}", config);

    std::fs::create_dir_all(&config.transcode.transcode_root)?;

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Background task: stop idle sessions
    {
        let state_bg = Arc::clone(&state);
        let period = Duration::from_secs(config.session.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if state_bg.is_shutdown() {
                    break;
                }
                let removed = state_bg.evict_idle_sessions().await;
                if removed > 0 {
                    tracing::info!("Evicted {} idle session(s)", removed);
                }
            }
        });
    }

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config.socket_addr().parse().map_err(|e| {
        HlsError::Config(format!("invalid listen address {}: {}", config.socket_addr(), e))
    })?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    tracing::info!("{} stopped", APP_NAME);

    Ok(())
}

/// Load the config file, falling back to defaults. A load error is returned
/// for logging once the subscriber is up.
fn load_config(path: &str) -> (ServerConfig, Option<String>) {
    if !std::path::Path::new(path).exists() {
        return (ServerConfig::default(), None);
    }
    match crate::config_file::ConfigFile::from_file(path) {
        Ok(cf) => (cf.into_server_config(), None),
        Err(e) => (ServerConfig::default(), Some(e.to_string())),
    }
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("hls_transcoder={},tower_http=debug", config.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    state.request_shutdown();
    // Stop encoders before the drain so pending segment requests fail fast
    state.orchestrator.shutdown().await;
}
