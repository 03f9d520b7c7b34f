/// A device position sample.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlaybackProgressInfo {
    pub current_seconds: f64,
    pub total_seconds: Option<f64>,
}

impl PlaybackProgressInfo {
    pub fn new(current_seconds: f64, total_seconds: Option<f64>) -> Self {
        Self { current_seconds, total_seconds }
    }
}
