//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - Server configuration
//! - The transcode orchestrator and seek coordinator
//! - The duration prober used when opening sessions
//!
//! It also implements the session control surface used by the HTTP layer:
//! open a session, serve its playlist and segments, close it.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{HlsError, Result};
use crate::playlist::build_playlist;
use crate::segment::{init_file_name, segment_file_name, DiskSegmentProbe, SegmentProbe};
use crate::transcode::{
    DurationProber, Encoder, FfmpegEncoder, FfprobeProber, SeekCoordinator, SeekOutcome,
    StartPosition, StartRequest, TranscodeOrchestrator, TranscodeSession,
};

/// Result of opening a session
#[derive(Debug, Clone, Serialize)]
pub struct OpenedSession {
    pub token: String,
    pub playlist_url: String,
    pub runtime_secs: f64,
    pub segment_count: u32,
    pub start_segment: u32,
}

/// Application state shared across all handlers
pub struct AppState {
    pub config: ServerConfig,
    pub orchestrator: Arc<TranscodeOrchestrator>,
    pub seek: SeekCoordinator,
    prober: Arc<dyn DurationProber>,
    shutdown: AtomicBool,
}

impl AppState {
    /// Create state backed by ffmpeg and ffprobe
    pub fn new(config: ServerConfig) -> Self {
        let encoder = Arc::new(FfmpegEncoder::new());
        let prober = Arc::new(FfprobeProber::new(config.transcode.ffprobe_path.clone()));
        Self::with_components(config, encoder, prober, Arc::new(DiskSegmentProbe::new()))
    }

    /// Create state with explicit collaborators
    pub fn with_components(
        config: ServerConfig,
        encoder: Arc<dyn Encoder>,
        prober: Arc<dyn DurationProber>,
        probe: Arc<dyn SegmentProbe>,
    ) -> Self {
        let orchestrator = TranscodeOrchestrator::new(
            config.transcode.clone(),
            config.max_concurrent_sessions,
            encoder,
            probe,
        );
        let seek = SeekCoordinator::new(Arc::clone(&orchestrator));
        Self {
            config,
            orchestrator,
            seek,
            prober,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Find the source file for a media reference: a file directly in the
    /// media root whose stem equals the reference
    pub fn resolve_media(&self, media_ref_id: &str) -> Result<PathBuf> {
        validate_media_ref(media_ref_id)?;

        let root = &self.config.transcode.media_root;
        let entries = std::fs::read_dir(root).map_err(|e| {
            HlsError::SourceUnavailable(format!("media root {:?}: {}", root, e))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(media_ref_id) {
                return Ok(path);
            }
        }

        Err(HlsError::SourceUnavailable(format!(
            "no media named '{}'",
            media_ref_id
        )))
    }

    /// Open a new playback session and wait for its startup buffer
    pub async fn open_session(
        &self,
        media_ref_id: &str,
        start_time_secs: Option<f64>,
    ) -> Result<OpenedSession> {
        let media_path = self.resolve_media(media_ref_id)?;
        let runtime_secs = self.probe_duration(media_path.clone()).await?;

        let token = Uuid::new_v4().to_string();
        let output_dir = self.config.transcode.transcode_root.join(&token);
        let request = StartRequest {
            token: token.clone(),
            media_ref_id: media_ref_id.to_string(),
            media_path,
            output_dir: output_dir.clone(),
            runtime_secs,
            start: StartPosition::Time(start_time_secs.unwrap_or(0.0).max(0.0)),
            min_buffered_segments: self.config.transcode.min_buffered_segments,
        };

        info!(
            "Opening session {} for '{}' at {:?}s (runtime {:.3}s)",
            token, media_ref_id, start_time_secs, runtime_secs
        );

        match self.orchestrator.start_transcode(request).await {
            Ok(session) => Ok(OpenedSession {
                playlist_url: format!("/hls/{}.m3u8?token={}", media_ref_id, token),
                token,
                runtime_secs,
                segment_count: session.segment_count(),
                start_segment: session.start_segment,
            }),
            Err(e) => {
                warn!("Failed to open session {}: {}", token, e);
                if let Err(stop_err) = self.orchestrator.stop_session(&token, true).await {
                    warn!("Cleanup of session {} failed: {}", token, stop_err);
                }
                if let Err(rm_err) = std::fs::remove_dir_all(&output_dir) {
                    if rm_err.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {:?}: {}", output_dir, rm_err);
                    }
                }
                Err(e)
            }
        }
    }

    /// Playlist text for a session
    pub fn playlist(&self, token: &str, name_stem: &str) -> Result<String> {
        let session = self.session_for(token, name_stem)?;
        Ok(build_playlist(
            &session.media_ref_id,
            &session.plan,
            token,
            session.container,
        ))
    }

    /// Wait until segment `index` is written and return its path
    pub async fn request_segment(
        &self,
        token: &str,
        name_stem: &str,
        index: u32,
    ) -> Result<PathBuf> {
        let session = self.session_for(token, name_stem)?;
        let outcome = self.seek.set_segment_target(token, index).await?;
        if outcome != SeekOutcome::Ready {
            info!("Segment {} of {} served after {:?}", index, token, outcome);
        }
        Ok(session
            .output_dir
            .join(segment_file_name(&session.media_ref_id, index, session.container)))
    }

    /// Path of the fMP4 initialization segment of a session
    pub fn init_segment_path(&self, token: &str, name_stem: &str) -> Result<PathBuf> {
        let session = self.session_for(token, name_stem)?;
        if !session.container.has_init_segment() {
            return Err(HlsError::InvalidRequest(
                "session output has no init segment".to_string(),
            ));
        }
        Ok(session
            .output_dir
            .join(init_file_name(&session.media_ref_id, session.container)))
    }

    pub async fn close_session(&self, token: &str, delete_output: bool) -> Result<()> {
        self.orchestrator.stop_session(token, delete_output).await
    }

    /// Stop sessions that have not been accessed within the idle timeout
    pub async fn evict_idle_sessions(&self) -> usize {
        self.orchestrator
            .evict_idle(
                self.config.session.idle_timeout_secs,
                self.config.session.delete_output_on_expire,
            )
            .await
    }

    /// Request shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown is requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Look up a session, check the requested stem and record the access
    fn session_for(&self, token: &str, name_stem: &str) -> Result<TranscodeSession> {
        let session = self
            .orchestrator
            .session(token)
            .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;
        if session.media_ref_id != name_stem {
            return Err(HlsError::SessionNotFound(format!(
                "{} has no media '{}'",
                token, name_stem
            )));
        }
        self.orchestrator.touch(token);
        Ok(session)
    }

    async fn probe_duration(&self, path: PathBuf) -> Result<f64> {
        let prober = Arc::clone(&self.prober);
        tokio::task::spawn_blocking(move || prober.probe_duration(Path::new(&path)))
            .await
            .map_err(|e| HlsError::Probe(format!("probe task failed: {}", e)))?
    }
}

/// Media references are plain file stems
fn validate_media_ref(media_ref_id: &str) -> Result<()> {
    let valid = !media_ref_id.is_empty()
        && media_ref_id != "."
        && media_ref_id != ".."
        && media_ref_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(HlsError::InvalidRequest(format!(
            "invalid media reference '{}'",
            media_ref_id
        )))
    }
}
