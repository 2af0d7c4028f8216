//! Transcode module
//!
//! This module runs and coordinates on-demand HLS encodes:
//! - ffmpeg command construction and progress parsing
//! - Session state and segment progress tracking
//! - Session registry, job launch and cancellation
//! - Seek handling (wait, retarget or restart)

pub mod encoder;
pub mod orchestrator;
pub mod progress;
pub mod seek;
pub mod session;

pub use encoder::{
    DurationProber, Encoder, EncoderCommand, EncoderEvent, FfmpegEncoder, FfprobeProber,
};
pub use orchestrator::{StartPosition, StartRequest, TranscodeOrchestrator};
pub use seek::{SeekCoordinator, SeekOutcome};
pub use session::{SessionSnapshot, TranscodeSession};
