// src/audio/playback.rs
use crate::audio::{error::AudioError, progress::PlaybackProgressInfo};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Notifications published by an audio device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Position changed. Devices may emit these at a very high rate.
    TimeUpdate(PlaybackProgressInfo),
    /// The loaded stream played to its end. Some backends emit this twice.
    Ended,
    /// Asynchronous device failure (bad stream, codec error, lost output).
    Error(String),
    /// The device started (`true`) or finished (`false`) buffering.
    Loading(bool),
}

/// Trait defining the controls for an audio playback backend.
///
/// Implementations decode and output audio; the session only sequences calls.
/// Methods take `&self` so the device can be shared behind an `Arc` and use
/// interior mutability for its own state.
#[async_trait]
pub trait AudioPlaybackControl: Send + Sync {
    /// Opens the stream at `url`. Settles once the device can start playback.
    async fn load(&self, url: &str, total_duration_ticks: Option<i64>) -> Result<(), AudioError>;

    /// Starts or resumes output of the loaded stream.
    async fn play(&self) -> Result<(), AudioError>;

    async fn pause(&self) -> Result<(), AudioError>;

    /// Seeks to `seconds`. Rejects negative or non-finite positions and
    /// clamps to the stream duration.
    async fn seek(&self, seconds: f64) -> Result<(), AudioError>;

    /// Sets output volume in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<(), AudioError>;

    async fn current_time(&self) -> f64;

    async fn duration(&self) -> Option<f64>;

    /// Subscribes to device events. Dropping the receiver unsubscribes.
    ///
    /// `Error` and `Ended` always refer to the most recently loaded stream.
    /// Implementations must not emit them for a load that was abandoned
    /// because a newer `load` replaced it; the orchestrator applies them to
    /// whatever load is current.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;

    /// Performs a full shutdown of the audio backend.
    /// Should be called before dropping the implementing struct.
    async fn shutdown(&self) -> Result<(), AudioError>;
}
