use crate::audio::{
    AudioError, AudioPlaybackControl, LoadToken, OrchestratorConfig, PlaybackOrchestrator, PlaybackProgressInfo,
    TransportEvent,
};
use crate::config::PlaybackSettings;
use crate::jellyfin::models::Track;
use crate::jellyfin::reporter::{JellyfinReporter, QueueContext};
use crate::jellyfin::JellyfinApiContract;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

mod command_handler;
mod item_fetcher;
pub mod queue;
mod run_loop;
mod state;
#[cfg(test)]
mod tests;

// Re-export key types for convenience
pub use queue::{Queue, RepeatMode, ShuffleMode};
pub use state::{
    InternalPlayerState, InternalPlayerStateUpdate, MediaMetadata, MediaSessionIntent, PlaybackStatus, PlayerCommand,
};

const PLAYER_LOG_TARGET: &str = "jelly_session::player";

/// Returned by [`SessionHandle`] calls once the session is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Closed => write!(f, "Playback session is closed"),
        }
    }
}

impl Error for SessionError {}

impl<T> From<mpsc::error::SendError<T>> for SessionError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        SessionError::Closed
    }
}

impl From<oneshot::error::RecvError> for SessionError {
    fn from(_: oneshot::error::RecvError) -> Self {
        SessionError::Closed
    }
}

/// Owns the queue, the transport and the reporter. Runs as a single task;
/// everything else talks to it through [`PlayerCommand`]s.
pub struct Player {
    // --- Configuration ---
    jellyfin_client: Arc<dyn JellyfinApiContract>,
    previous_restart_threshold_secs: f64,

    // --- State ---
    queue: Queue,
    status: PlaybackStatus,
    position_seconds: f64,
    duration_seconds: f64,
    volume: u8,
    is_muted: bool,
    /// Token of the load the session currently cares about.
    current_token: Option<LoadToken>,

    // --- Communication ---
    command_rx: mpsc::Receiver<PlayerCommand>,
    state_update_tx: broadcast::Sender<InternalPlayerStateUpdate>,
    metadata_tx: watch::Sender<Option<MediaMetadata>>,

    // --- Transport ---
    orchestrator: PlaybackOrchestrator,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    reporter: JellyfinReporter,
}

impl Player {
    /// Creates a new Player instance and the command channel sender.
    /// The Player itself should be run in a separate task using `Player::run`.
    pub fn new(
        jellyfin_client: Arc<dyn JellyfinApiContract>,
        device: Arc<dyn AudioPlaybackControl>,
        settings: &PlaybackSettings,
    ) -> (Self, mpsc::Sender<PlayerCommand>) {
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer_size.max(1));
        let (state_update_tx, _) = broadcast::channel(settings.state_update_capacity.max(1));
        let (metadata_tx, _) = watch::channel(None);

        let (orchestrator, transport_rx) = PlaybackOrchestrator::new(
            device,
            OrchestratorConfig {
                ui_updates_per_sec: settings.ui_updates_per_sec,
                media_session_updates_per_sec: settings.media_session_updates_per_sec,
            },
        );
        let volume = settings.initial_volume.min(100);
        orchestrator.set_volume(f32::from(volume) / 100.0);

        let reporter = JellyfinReporter::new(
            jellyfin_client.clone(),
            StdDuration::from_secs(settings.progress_report_interval_secs.max(1)),
        );

        let player = Player {
            jellyfin_client,
            previous_restart_threshold_secs: settings.previous_restart_threshold_secs as f64,
            queue: Queue::new(),
            status: PlaybackStatus::Idle,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            volume,
            is_muted: false,
            current_token: None,
            command_rx,
            state_update_tx,
            metadata_tx,
            orchestrator,
            transport_rx,
            reporter,
        };

        (player, command_tx)
    }

    // --- Private Helper Methods ---

    /// Sends a state update via the broadcast channel, logging errors.
    fn broadcast_update(&self, update: InternalPlayerStateUpdate) {
        trace!(target: PLAYER_LOG_TARGET, "Broadcasting state update: {:?}", update);
        if self.state_update_tx.send(update).is_err() {
            // No receivers is normal when nothing is listening yet.
            trace!(target: PLAYER_LOG_TARGET, "No active listeners for state update.");
        }
    }

    fn broadcast_queue_changed(&self) {
        self.broadcast_update(InternalPlayerStateUpdate::QueueChanged {
            queue_ids: self.queue.item_ids(),
            current_index: self.queue.current_index(),
        });
    }

    async fn sync_reporter_queue(&self) {
        self.reporter
            .set_queue_context(QueueContext {
                item_ids: self.queue.item_ids(),
                current_index: self.queue.current_index(),
                shuffle_mode: self.queue.shuffle_mode().as_report_str().to_string(),
                repeat_mode: self.queue.repeat_mode().as_report_str().to_string(),
            })
            .await;
    }

    fn publish_metadata(&self, track: Option<&Track>) {
        let metadata = track.map(|t| MediaMetadata {
            title: t.name.clone(),
            artist: t.display_artist(),
            album: t.album.clone(),
            artwork_url: self.jellyfin_client.get_artwork_url(t),
        });
        self.metadata_tx.send_replace(metadata);
    }

    /// Constructs the full current state object.
    fn get_full_state(&self) -> InternalPlayerState {
        InternalPlayerState {
            status: self.status.clone(),
            current_item: self.queue.current_item().cloned(),
            position_seconds: self.position_seconds,
            duration_seconds: self.duration_seconds,
            volume: self.volume,
            is_muted: self.is_muted,
            queue_ids: self.queue.item_ids(),
            current_queue_index: self.queue.current_index(),
            repeat_mode: self.queue.repeat_mode(),
            shuffle_mode: self.queue.shuffle_mode(),
            has_next: self.queue.has_next(),
            has_previous: self.queue.has_previous(),
        }
    }

    // --- Main Run Loop ---

    /// Runs the player's command processing loop. This should be spawned as a Tokio task.
    #[instrument(skip(self))]
    pub async fn run(&mut self) {
        run_loop::run_player_loop(self).await;
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<PlayerCommand>,
    state_update_tx: broadcast::Sender<InternalPlayerStateUpdate>,
    metadata_rx: watch::Receiver<Option<MediaMetadata>>,
    media_position_rx: watch::Receiver<PlaybackProgressInfo>,
}

impl SessionHandle {
    async fn send(&self, command: PlayerCommand) -> Result<(), SessionError> {
        self.command_tx.send(command).await?;
        Ok(())
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        Ok(rx.await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InternalPlayerStateUpdate> {
        self.state_update_tx.subscribe()
    }

    /// Now-playing metadata for OS media controls.
    pub fn media_metadata(&self) -> watch::Receiver<Option<MediaMetadata>> {
        self.metadata_rx.clone()
    }

    /// Position published at the media-session rate.
    pub fn media_position(&self) -> watch::Receiver<PlaybackProgressInfo> {
        self.media_position_rx.clone()
    }

    /// Replaces the queue with `tracks` and starts playing at `start_index`.
    pub async fn play_tracks(&self, tracks: Vec<Track>, start_index: usize) -> Result<(), SessionError> {
        self.send(PlayerCommand::PlayTracks { tracks, start_index }).await
    }

    /// Resolves `item_ids` through the catalog, then behaves like `play_tracks`.
    pub async fn play_items(&self, item_ids: Vec<String>, start_index: usize) -> Result<(), SessionError> {
        self.send(PlayerCommand::PlayNow { item_ids, start_index }).await
    }

    pub async fn add_to_queue(&self, tracks: Vec<Track>) -> Result<(), SessionError> {
        self.send(PlayerCommand::AddToQueue { tracks }).await
    }

    pub async fn insert_at(&self, track: Track, index: usize) -> Result<(), SessionError> {
        self.send(PlayerCommand::InsertAt { track, index }).await
    }

    pub async fn remove_at(&self, index: usize) -> Result<Option<Track>, SessionError> {
        self.request(|responder| PlayerCommand::RemoveAt { index, responder }).await
    }

    pub async fn move_item(&self, from: usize, to: usize) -> Result<bool, SessionError> {
        self.request(|responder| PlayerCommand::MoveItem { from, to, responder }).await
    }

    pub async fn jump_to(&self, index: usize) -> Result<Option<Track>, SessionError> {
        self.request(|responder| PlayerCommand::JumpTo { index, responder }).await
    }

    pub async fn clear_queue(&self) -> Result<(), SessionError> {
        self.send(PlayerCommand::ClearQueue).await
    }

    pub async fn play_pause(&self) -> Result<(), SessionError> {
        self.send(PlayerCommand::PlayPauseToggle).await
    }

    /// Pauses playback. Ignored unless playing; a load in progress is not
    /// interrupted.
    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(PlayerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(PlayerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(PlayerCommand::Stop).await
    }

    pub async fn next(&self) -> Result<Option<Track>, SessionError> {
        self.request(PlayerCommand::Next).await
    }

    pub async fn previous(&self) -> Result<Option<Track>, SessionError> {
        self.request(PlayerCommand::Previous).await
    }

    pub async fn seek(&self, seconds: f64) -> Result<Result<(), AudioError>, SessionError> {
        self.request(|responder| PlayerCommand::Seek { seconds, responder }).await
    }

    /// Sets the output volume, `0.0..=1.0`.
    pub async fn set_volume(&self, volume: f32) -> Result<(), SessionError> {
        self.send(PlayerCommand::SetVolume(volume)).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), SessionError> {
        self.send(PlayerCommand::SetMuted(muted)).await
    }

    pub async fn set_shuffle_mode(&self, mode: ShuffleMode) -> Result<(), SessionError> {
        self.send(PlayerCommand::SetShuffle(mode)).await
    }

    pub async fn toggle_shuffle_mode(&self) -> Result<ShuffleMode, SessionError> {
        self.request(PlayerCommand::ToggleShuffle).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<(), SessionError> {
        self.send(PlayerCommand::SetRepeat(mode)).await
    }

    pub async fn toggle_repeat_mode(&self) -> Result<RepeatMode, SessionError> {
        self.request(PlayerCommand::ToggleRepeat).await
    }

    pub async fn media_intent(&self, intent: MediaSessionIntent) -> Result<(), SessionError> {
        self.send(PlayerCommand::MediaIntent(intent)).await
    }

    pub async fn get_state(&self) -> Result<InternalPlayerState, SessionError> {
        self.request(PlayerCommand::GetFullState).await
    }
}

/// A running playback session: the player task plus a handle to it.
pub struct PlaybackSession {
    handle: SessionHandle,
    task: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    /// Builds the player over `device` and spawns its task. Must be called
    /// from within a Tokio runtime.
    pub fn create(
        jellyfin_client: Arc<dyn JellyfinApiContract>,
        device: Arc<dyn AudioPlaybackControl>,
        settings: &PlaybackSettings,
    ) -> Self {
        let (mut player, command_tx) = Player::new(jellyfin_client, device, settings);
        let handle = SessionHandle {
            command_tx,
            state_update_tx: player.state_update_tx.clone(),
            metadata_rx: player.metadata_tx.subscribe(),
            media_position_rx: player.orchestrator.media_position(),
        };
        let task = tokio::spawn(async move {
            player.run().await;
        });
        info!(target: PLAYER_LOG_TARGET, "Playback session created.");
        PlaybackSession { handle, task: Some(task) }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stops playback, flushes the final report and tears the session down.
    /// Handles still held elsewhere get `SessionError::Closed` afterwards.
    #[instrument(skip(self))]
    pub async fn dispose(mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        if self.handle.command_tx.send(PlayerCommand::Shutdown).await.is_err() {
            debug!(target: PLAYER_LOG_TARGET, "Player task already gone before dispose.");
        }
        let timeout_duration = StdDuration::from_secs(10);
        tokio::select! {
            biased;
            res = &mut task => match res {
                Ok(()) => info!(target: PLAYER_LOG_TARGET, "Playback session disposed."),
                Err(e) => error!(target: PLAYER_LOG_TARGET, "Player task panicked: {:?}", e),
            },
            _ = tokio::time::sleep(timeout_duration) => {
                error!(target: PLAYER_LOG_TARGET, "Timeout waiting for player task after {:?}. Aborting.", timeout_duration);
                task.abort();
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
