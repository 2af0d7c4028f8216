//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{HlsError, Result};
use crate::segment::SegmentContainer;

/// Encoder and segment layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: PathBuf,

    /// Path or name of the ffprobe binary
    pub ffprobe_path: PathBuf,

    /// Directory holding source media, looked up by file stem
    pub media_root: PathBuf,

    /// Directory under which each session gets `<token>/`
    pub transcode_root: PathBuf,

    /// Segment length in seconds (also the playlist target duration)
    pub segment_length_secs: u32,

    /// Segments that must exist past the start before a caller is released
    pub min_buffered_segments: u32,

    /// Container written by the HLS muxer
    pub segment_container: SegmentContainer,

    /// Capacity of each per-session progress broadcast channel
    pub progress_channel_capacity: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            media_root: PathBuf::from("./media"),
            transcode_root: std::env::temp_dir().join("hls-transcoder"),
            segment_length_secs: 6,
            min_buffered_segments: 2,
            segment_container: SegmentContainer::MpegTs,
            progress_channel_capacity: 16,
        }
    }
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for this long are stopped
    pub idle_timeout_secs: u64,

    /// How often the eviction task runs
    pub cleanup_interval_secs: u64,

    /// Remove the output directory of evicted sessions
    pub delete_output_on_expire: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600, // 10 minutes
            cleanup_interval_secs: 60,
            delete_output_on_expire: true,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Transcode configuration
    pub transcode: TranscodeConfig,

    /// Session configuration
    pub session: SessionConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (json, pretty)
    pub log_format: String,

    /// Maximum concurrent encoder jobs
    pub max_concurrent_sessions: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            transcode: TranscodeConfig::default(),
            session: SessionConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_concurrent_sessions: Some(16),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the segment math cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.transcode.segment_length_secs == 0 {
            return Err(HlsError::Config(
                "segment_length_secs must be greater than zero".to_string(),
            ));
        }
        if self.transcode.progress_channel_capacity == 0 {
            return Err(HlsError::Config(
                "progress_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
