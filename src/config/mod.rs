//! Settings loading, validation and persistence

mod settings;

pub use settings::{ConfigError, PlaybackSettings, Settings};
