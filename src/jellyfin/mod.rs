//! Jellyfin catalog client and playback reporting

pub mod api;
pub mod models;
pub mod models_playback;
pub mod reporter;

pub use api::*;
pub use models::*;
pub use models_playback::*;
pub use reporter::{JellyfinReporter, QueueContext};
