//! Playback-related data models for Jellyfin API

use serde::Serialize;

// --- Outgoing Playback Reporting Structures (for HTTP POST) ---

/// Represents an item in the NowPlayingQueue.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct QueueItem {
    pub id: String,
    pub playlist_item_id: String,
}

/// Base structure for playback reporting (Start, Progress, Stop).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackReportBase {
    pub queueable_media_types: Vec<String>, // e.g., ["Audio"]
    pub can_seek: bool,
    pub item_id: String,
    pub media_source_id: String,
    pub position_ticks: i64,
    pub volume_level: i32,
    pub is_paused: bool,
    pub is_muted: bool,
    pub play_method: String, // e.g., "DirectPlay"
    pub play_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_time_ticks: Option<i64>,
    pub playlist_index: Option<i32>,
    pub shuffle_mode: String, // "Shuffle" or "Sorted"
    pub repeat_mode: String,  // "RepeatNone", "RepeatAll" or "RepeatOne"
    pub now_playing_queue: Vec<QueueItem>,
}

/// Information specific to reporting playback stopped.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackStoppedInfoInner {
    pub played_to_completion: bool,
}

/// Full payload for reporting playback stopped via POST /Sessions/Playing/Stopped.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackStopReport {
    #[serde(flatten)]
    pub base: PlaybackReportBase,
    pub playback_stopped_info: PlaybackStoppedInfoInner,
}

/// Full payload for reporting playback progress via POST /Sessions/Playing/Progress.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackProgressReport {
    #[serde(flatten)]
    pub base: PlaybackReportBase,
}

/// Full payload for reporting playback start via POST /Sessions/Playing.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackStartReport {
    #[serde(flatten)]
    pub base: PlaybackReportBase,
}
