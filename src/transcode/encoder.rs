//! Encoder process boundary
//!
//! Builds the ffmpeg HLS command line, runs it with `-progress pipe:1` and
//! turns the progress blocks into [`EncoderEvent`]s. Duration probing goes
//! through ffprobe's JSON output.

use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HlsError, Result};
use crate::segment::{init_file_name, SegmentContainer};

/// Number of stderr lines kept for error reports
pub const STDERR_TAIL_LINES: usize = 20;

/// Fixed audio bitrate of the output
pub const AUDIO_BITRATE: &str = "128k";

/// Fixed audio channel count of the output
pub const AUDIO_CHANNELS: u32 = 2;

/// One HLS encode of a source file, starting at a given segment
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCommand {
    /// ffmpeg binary
    pub program: PathBuf,
    /// Source media file
    pub input: PathBuf,
    /// Directory the segments are written to
    pub output_dir: PathBuf,
    /// Segment file name stem
    pub name_stem: String,
    /// Input seek position in seconds
    pub start_time_secs: f64,
    /// Number given to the first written segment
    pub start_segment: u32,
    pub segment_length_secs: u32,
    pub container: SegmentContainer,
}

impl EncoderCommand {
    /// Muxer playlist written next to the segments. Never served.
    pub fn muxer_playlist_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.m3u8", self.name_stem))
    }

    /// Full argument list, program excluded
    pub fn args(&self) -> Vec<String> {
        let length = self.segment_length_secs.to_string();
        let segment_pattern = self.output_dir.join(format!(
            "{}%d.{}",
            self.name_stem,
            self.container.extension()
        ));

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-y".into(),
            "-ss".into(),
            format!("{:.3}", self.start_time_secs),
            "-i".into(),
            self.input.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a:0?".into(),
            "-c:v".into(),
            "libx264".into(),
            "-force_key_frames".into(),
            format!("expr:gte(t,n_forced*{})", length),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            AUDIO_BITRATE.into(),
            "-ac".into(),
            AUDIO_CHANNELS.to_string(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            length,
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_flags".into(),
            "independent_segments".into(),
            "-hls_segment_type".into(),
            self.container.muxer_segment_type().into(),
            "-start_number".into(),
            self.start_segment.to_string(),
            "-hls_segment_filename".into(),
            segment_pattern.to_string_lossy().into_owned(),
        ];

        if self.container.has_init_segment() {
            args.push("-hls_fmp4_init_filename".into());
            args.push(init_file_name(&self.name_stem, self.container));
        }

        args.push(self.muxer_playlist_path().to_string_lossy().into_owned());
        args
    }

    /// Human readable command line, for diagnostics only
    pub fn description(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// What a running encoder reports
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// Seconds of output written since the input seek point
    Progress { elapsed_secs: f64 },
    /// The process exited successfully
    Finished,
    /// The process could not run to completion
    Failed { message: String },
    /// The job was cancelled and the process has been reaped
    Cancelled,
}

/// Starts encoder jobs.
///
/// The returned channel closes only after the process is gone, so a caller
/// draining it knows the output directory is no longer being written.
pub trait Encoder: Send + Sync {
    fn start(
        &self,
        command: &EncoderCommand,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<EncoderEvent>>;
}

/// Accumulates `-progress` key/value lines into elapsed times
#[derive(Debug, Default)]
pub struct ProgressParser {
    out_time_us: Option<i64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. A `progress=` line closes a block and yields the last
    /// reported output time.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("out_time_us=") {
            self.out_time_us = value.trim().parse::<i64>().ok();
            None
        } else if line.starts_with("progress=") {
            match self.out_time_us.take() {
                Some(us) if us > 0 => Some(us as f64 / 1_000_000.0),
                _ => None,
            }
        } else {
            None
        }
    }
}

/// Encoder backed by an ffmpeg child process
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for FfmpegEncoder {
    fn start(
        &self,
        command: &EncoderCommand,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<EncoderEvent>> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            HlsError::EncoderLaunch(format!("failed to spawn {:?}: {}", command.program, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HlsError::EncoderLaunch("encoder stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HlsError::EncoderLaunch("encoder stderr not captured".to_string()))?;

        info!(
            "Started encoder pid={:?} start_segment={} start_time={:.3}",
            child.id(),
            command.start_segment,
            command.start_time_secs
        );

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let stderr_tail = tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES));
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = ProgressParser::new();

            let cancelled = loop {
                tokio::select! {
                    _ = cancel.cancelled() => break true,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(elapsed_secs) = parser.feed(&line) {
                                if tx.send(EncoderEvent::Progress { elapsed_secs }).await.is_err() {
                                    // Nobody listens any more
                                    break true;
                                }
                            }
                        }
                        Ok(None) => break false,
                        Err(e) => {
                            warn!("Error reading encoder progress: {}", e);
                            break false;
                        }
                    },
                }
            };

            if cancelled {
                if let Err(e) = child.start_kill() {
                    debug!("Encoder already gone on cancel: {}", e);
                }
            }

            let status = child.wait().await;
            let tail = stderr_tail.await.unwrap_or_default();

            let event = if cancelled {
                EncoderEvent::Cancelled
            } else {
                match status {
                    Ok(status) if status.success() => EncoderEvent::Finished,
                    Ok(status) => EncoderEvent::Failed {
                        message: format!("encoder exited with {}: {}", status, tail),
                    },
                    Err(e) => EncoderEvent::Failed {
                        message: format!("failed to wait for encoder: {}", e),
                    },
                }
            };

            let _ = tx.send(event).await;
        });

        Ok(rx)
    }
}

/// Keep the last `max_lines` lines of a stream, joined with newlines
async fn collect_tail<R: AsyncRead + Unpin>(reader: R, max_lines: usize) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(max_lines);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Reports the runtime of a media file
pub trait DurationProber: Send + Sync {
    fn probe_duration(&self, path: &Path) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration prober backed by `ffprobe -show_format`.
///
/// Blocking; run it on the blocking pool.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DurationProber for FfprobeProber {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = std::process::Command::new(&self.program)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .arg("-show_format")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| HlsError::Probe(format!("failed to run {:?}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(HlsError::Probe(format!(
                "ffprobe failed for {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_probe_duration(&output.stdout)
    }
}

/// Extract a usable runtime from ffprobe JSON
pub fn parse_probe_duration(json: &[u8]) -> Result<f64> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| HlsError::Probe(format!("invalid ffprobe output: {}", e)))?;

    let duration = probe
        .format
        .duration
        .ok_or_else(|| HlsError::Probe("no duration reported".to_string()))?
        .trim()
        .parse::<f64>()
        .map_err(|e| HlsError::Probe(format!("unparsable duration: {}", e)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(HlsError::Probe(format!("unusable duration {}", duration)));
    }
    Ok(duration)
}
