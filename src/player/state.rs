use crate::audio::AudioError;
use crate::jellyfin::models::Track;
use crate::player::queue::{RepeatMode, ShuffleMode};
use tokio::sync::oneshot;

/// Observable playback status of the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error(String),
}

impl PlaybackStatus {
    /// Loading, playing or paused: a track is held by the device.
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused)
    }
}

/// Transport intents coming from OS media controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaSessionIntent {
    Play,
    Pause,
    PlayPause,
    Next,
    Previous,
    SeekTo(f64),
    Stop,
}

/// Now-playing metadata published for OS media integration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
}

/// Commands that can be sent to the Player task.
#[derive(Debug)]
pub enum PlayerCommand {
    PlayTracks { tracks: Vec<Track>, start_index: usize },
    PlayNow { item_ids: Vec<String>, start_index: usize },
    AddToQueue { tracks: Vec<Track> },
    InsertAt { track: Track, index: usize },
    RemoveAt { index: usize, responder: oneshot::Sender<Option<Track>> },
    MoveItem { from: usize, to: usize, responder: oneshot::Sender<bool> },
    JumpTo { index: usize, responder: oneshot::Sender<Option<Track>> },
    ClearQueue,
    PlayPauseToggle,
    Pause,
    Resume,
    Stop,
    Next(oneshot::Sender<Option<Track>>),
    Previous(oneshot::Sender<Option<Track>>),
    Seek { seconds: f64, responder: oneshot::Sender<Result<(), AudioError>> },
    SetVolume(f32),
    SetMuted(bool),
    SetShuffle(ShuffleMode),
    ToggleShuffle(oneshot::Sender<ShuffleMode>),
    SetRepeat(RepeatMode),
    ToggleRepeat(oneshot::Sender<RepeatMode>),
    MediaIntent(MediaSessionIntent),
    GetFullState(oneshot::Sender<InternalPlayerState>),
    Shutdown,
}

/// Represents the detailed internal state of the player.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalPlayerState {
    pub status: PlaybackStatus,
    pub current_item: Option<Track>,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub volume: u8,
    pub is_muted: bool,
    pub queue_ids: Vec<String>,
    pub current_queue_index: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: ShuffleMode,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Updates broadcast by the Player task about its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalPlayerStateUpdate {
    Loading {
        item: Track,
    },
    Playing {
        item: Track,
        position_seconds: f64,
        queue_ids: Vec<String>,
        queue_index: Option<usize>,
    },
    Paused {
        item: Track,
        position_seconds: f64,
        queue_ids: Vec<String>,
        queue_index: Option<usize>,
    },
    Stopped,
    Progress {
        item_id: String,
        position_seconds: f64,
        duration_seconds: f64,
    },
    QueueChanged {
        queue_ids: Vec<String>,
        current_index: Option<usize>,
    },
    ModesChanged {
        shuffle_mode: ShuffleMode,
        repeat_mode: RepeatMode,
    },
    VolumeChanged {
        volume: u8,
        is_muted: bool,
    },
    Buffering(bool),
    Error(String),
}
