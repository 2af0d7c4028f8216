use thiserror::Error;

/// Main error type for the transcode server
#[derive(Error, Debug)]
pub enum HlsError {
    /// The media file is missing or unreadable
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The encoder could not be spawned or died before producing a buffer
    #[error("Encoder failed to start: {0}")]
    EncoderLaunch(String),

    /// The encoder exited with an error after making progress
    #[error("Encoder process failed: {0}")]
    EncoderProcess(String),

    /// Duration probing failed or returned an unusable runtime
    #[error("Probe error: {0}")]
    Probe(String),

    /// No session is registered for the token
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The segment index lies outside the planned playlist
    #[error("Segment not found: token={token}, seq={sequence}")]
    SegmentNotFound { token: String, sequence: u32 },

    /// The concurrent encoder limit has been reached
    #[error("Too many active sessions (limit {0})")]
    TooManySessions(usize),

    /// The server is stopping and launches no more encoders
    #[error("Server is shutting down")]
    ShuttingDown,

    /// The request is malformed (bad media reference, bad file name)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HlsError>;
