//! Audio device contract and the orchestrator that owns the device

pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod progress;
pub mod simulated;
pub mod throttle;

pub use error::AudioError;
pub use orchestrator::{LoadOutcome, LoadToken, OrchestratorConfig, PlaybackOrchestrator, TransportEvent, TransportState};
pub use playback::{AudioPlaybackControl, DeviceEvent};
pub use progress::PlaybackProgressInfo;
pub use simulated::SimulatedDevice;
pub use throttle::RateLimiter;
