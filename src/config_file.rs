//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{ServerConfig, SessionConfig, TranscodeConfig};
use crate::segment::SegmentContainer;

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Transcode settings
    pub transcode: TranscodeSettings,
    /// Session settings
    pub session: Option<SessionSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Limits settings
    pub limits: Option<LimitsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeSettings {
    /// ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    /// ffprobe binary
    pub ffprobe_path: Option<PathBuf>,
    /// Source media directory
    pub media_root: PathBuf,
    /// Output directory root
    pub transcode_root: PathBuf,
    /// Segment length in seconds
    pub segment_length_secs: Option<u32>,
    /// Startup buffer in segments
    pub min_buffered_segments: Option<u32>,
    /// mpegts or fmp4
    pub segment_container: Option<SegmentContainer>,
    /// Progress broadcast capacity
    pub progress_channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Idle timeout in seconds
    pub idle_timeout_secs: Option<u64>,
    /// Eviction interval in seconds
    pub cleanup_interval_secs: Option<u64>,
    /// Delete output of evicted sessions
    pub delete_output_on_expire: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    /// Maximum concurrent encoder jobs
    pub max_concurrent_sessions: Option<usize>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let transcode = TranscodeConfig::default();
        let session = SessionConfig::default();
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
                cors_enabled: Some(true),
            },
            transcode: TranscodeSettings {
                ffmpeg_path: Some(transcode.ffmpeg_path),
                ffprobe_path: Some(transcode.ffprobe_path),
                media_root: transcode.media_root,
                transcode_root: transcode.transcode_root,
                segment_length_secs: Some(transcode.segment_length_secs),
                min_buffered_segments: Some(transcode.min_buffered_segments),
                segment_container: Some(transcode.segment_container),
                progress_channel_capacity: Some(transcode.progress_channel_capacity),
            },
            session: Some(SessionSettings {
                idle_timeout_secs: Some(session.idle_timeout_secs),
                cleanup_interval_secs: Some(session.cleanup_interval_secs),
                delete_output_on_expire: Some(session.delete_output_on_expire),
            }),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
            limits: Some(LimitsSettings {
                max_concurrent_sessions: Some(16),
            }),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let t = self.transcode;
        let session = self.session.unwrap_or(SessionSettings {
            idle_timeout_secs: None,
            cleanup_interval_secs: None,
            delete_output_on_expire: None,
        });

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            transcode: TranscodeConfig {
                ffmpeg_path: t.ffmpeg_path.unwrap_or(defaults.transcode.ffmpeg_path),
                ffprobe_path: t.ffprobe_path.unwrap_or(defaults.transcode.ffprobe_path),
                media_root: t.media_root,
                transcode_root: t.transcode_root,
                segment_length_secs: t
                    .segment_length_secs
                    .unwrap_or(defaults.transcode.segment_length_secs),
                min_buffered_segments: t
                    .min_buffered_segments
                    .unwrap_or(defaults.transcode.min_buffered_segments),
                segment_container: t
                    .segment_container
                    .unwrap_or(defaults.transcode.segment_container),
                progress_channel_capacity: t
                    .progress_channel_capacity
                    .unwrap_or(defaults.transcode.progress_channel_capacity),
            },
            session: SessionConfig {
                idle_timeout_secs: session
                    .idle_timeout_secs
                    .unwrap_or(defaults.session.idle_timeout_secs),
                cleanup_interval_secs: session
                    .cleanup_interval_secs
                    .unwrap_or(defaults.session.cleanup_interval_secs),
                delete_output_on_expire: session
                    .delete_output_on_expire
                    .unwrap_or(defaults.session.delete_output_on_expire),
            },
            cors_enabled: self.server.cors_enabled.unwrap_or(true),
            log_level: self
                .logging
                .as_ref()
                .map(|l| l.level.clone())
                .unwrap_or(defaults.log_level),
            log_format: self
                .logging
                .and_then(|l| l.format)
                .unwrap_or(defaults.log_format),
            max_concurrent_sessions: self
                .limits
                .map(|l| l.max_concurrent_sessions)
                .unwrap_or(defaults.max_concurrent_sessions),
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}
