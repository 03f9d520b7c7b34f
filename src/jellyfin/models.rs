//! Data models for Jellyfin API responses

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server time unit: 100-nanosecond ticks.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Converts a local position in seconds to server ticks, flooring fractional ticks.
/// Negative and non-finite inputs map to zero.
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * TICKS_PER_SECOND as f64).floor() as i64
}

/// Converts server ticks to seconds.
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Represents a media item in a Jellyfin library
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MediaItem {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub media_type: String,
    #[serde(rename = "IsFolder", default)]
    pub is_folder: bool,
    #[serde(rename = "RunTimeTicks", default)]
    pub run_time_ticks: Option<i64>, // Duration in 100-nanosecond units
    #[serde(rename = "Album", default)]
    pub album: Option<String>,
    #[serde(rename = "AlbumId", default)]
    pub album_id: Option<String>,
    #[serde(rename = "AlbumArtist", default)]
    pub album_artist: Option<String>,
    #[serde(rename = "Artists", default)]
    pub artists: Vec<String>,
    #[serde(rename = "ImageTags", default)]
    pub image_tags: HashMap<String, String>,
}

/// Represents a collection of media items with additional metadata
#[derive(Deserialize, Serialize, Debug)]
pub struct ItemsResponse {
    #[serde(rename = "Items")]
    pub items: Vec<MediaItem>,
    #[serde(rename = "TotalRecordCount")]
    pub total_record_count: i32,
}

/// A playable audio track as the playback session sees it.
///
/// Tracks are immutable values owned by whoever fetched them; the session
/// only clones and compares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub run_time_ticks: Option<i64>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub album_artist: Option<String>,
    pub artists: Vec<String>,
    /// Primary image tag, used to build artwork URLs.
    pub image_tag: Option<String>,
}

impl Track {
    /// Minimal track with just an id, a title and an optional duration.
    pub fn new(id: impl Into<String>, name: impl Into<String>, run_time_ticks: Option<i64>) -> Self {
        Track {
            id: id.into(),
            name: name.into(),
            run_time_ticks,
            album: None,
            album_id: None,
            album_artist: None,
            artists: Vec::new(),
            image_tag: None,
        }
    }

    /// Track duration in seconds, zero when the server did not supply one.
    pub fn duration_seconds(&self) -> f64 {
        self.run_time_ticks.map(ticks_to_seconds).unwrap_or(0.0)
    }

    /// Display artist: joined track artists, falling back to the album artist.
    pub fn display_artist(&self) -> Option<String> {
        if !self.artists.is_empty() {
            Some(self.artists.join(", "))
        } else {
            self.album_artist.clone()
        }
    }
}

impl From<MediaItem> for Track {
    fn from(item: MediaItem) -> Self {
        let image_tag = item.image_tags.get("Primary").cloned();
        Track {
            id: item.id,
            name: item.name,
            run_time_ticks: item.run_time_ticks,
            album: item.album,
            album_id: item.album_id,
            album_artist: item.album_artist,
            artists: item.artists,
            image_tag,
        }
    }
}
