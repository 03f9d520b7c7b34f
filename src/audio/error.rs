use std::error::Error;

/// Error types specific to audio playback.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The device could not open or decode the stream.
    StreamError(String),
    /// The device failed to start, pause or otherwise change transport state.
    PlaybackError(String),
    /// Seek target was negative or not a finite number.
    InvalidSeek(f64),
    InvalidState(String),
    /// The device runner has shut down and no longer accepts requests.
    RunnerClosed,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::StreamError(e) => write!(f, "Streaming error: {}", e),
            AudioError::PlaybackError(e) => write!(f, "Playback error: {}", e),
            AudioError::InvalidSeek(s) => write!(f, "Invalid seek position: {}", s),
            AudioError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            AudioError::RunnerClosed => write!(f, "Audio device runner is closed"),
        }
    }
}

impl Error for AudioError {}
