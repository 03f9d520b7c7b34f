use super::{item_fetcher, InternalPlayerStateUpdate, MediaSessionIntent, PlaybackStatus, Player, PLAYER_LOG_TARGET};
use crate::audio::{AudioError, LoadOutcome, LoadToken, TransportEvent};
use crate::jellyfin::models::Track;
use crate::player::queue::{RepeatMode, ShuffleMode};
use tracing::{debug, error, info, instrument, trace, warn};

// --- Status bookkeeping ---

/// Records `status`, forwards it to the reporter and broadcasts it.
async fn set_status(player: &mut Player, status: PlaybackStatus) {
    if player.status == status {
        return;
    }
    debug!(target: PLAYER_LOG_TARGET, from = ?player.status, to = ?status, "Status change.");
    player.status = status.clone();
    player.reporter.record_status(&status).await;

    let item = player.queue.current_item().cloned();
    let update = match (status, item) {
        (PlaybackStatus::Loading, Some(item)) => InternalPlayerStateUpdate::Loading { item },
        (PlaybackStatus::Playing, Some(item)) => InternalPlayerStateUpdate::Playing {
            item,
            position_seconds: player.position_seconds,
            queue_ids: player.queue.item_ids(),
            queue_index: player.queue.current_index(),
        },
        (PlaybackStatus::Paused, Some(item)) => InternalPlayerStateUpdate::Paused {
            item,
            position_seconds: player.position_seconds,
            queue_ids: player.queue.item_ids(),
            queue_index: player.queue.current_index(),
        },
        (PlaybackStatus::Error(message), _) => InternalPlayerStateUpdate::Error(message),
        _ => InternalPlayerStateUpdate::Stopped,
    };
    player.broadcast_update(update);
}

/// Device-level failure: drop the current load and surface the message.
async fn fail_playback(player: &mut Player, message: String) {
    error!(target: PLAYER_LOG_TARGET, "Playback failed: {}", message);
    player.orchestrator.stop();
    player.orchestrator.mark_errored(message.clone());
    player.current_token = None;
    set_status(player, PlaybackStatus::Error(message)).await;
}

async fn stop_playback(player: &mut Player) {
    if !player.status.is_active() {
        trace!(target: PLAYER_LOG_TARGET, "Stop requested while not active.");
        return;
    }
    player.orchestrator.stop();
    player.current_token = None;
    set_status(player, PlaybackStatus::Stopped).await;
}

fn broadcast_progress(player: &Player) {
    if let Some(item) = player.queue.current_item() {
        player.broadcast_update(InternalPlayerStateUpdate::Progress {
            item_id: item.id.clone(),
            position_seconds: player.position_seconds,
            duration_seconds: player.duration_seconds,
        });
    }
}

async fn queue_changed(player: &Player) {
    player.sync_reporter_queue().await;
    player.broadcast_queue_changed();
}

async fn modes_changed(player: &Player) {
    player.sync_reporter_queue().await;
    player.broadcast_update(InternalPlayerStateUpdate::ModesChanged {
        shuffle_mode: player.queue.shuffle_mode(),
        repeat_mode: player.queue.repeat_mode(),
    });
    player.broadcast_queue_changed();
}

// --- Starting playback ---

/// Loads and plays whatever the queue says is current, superseding any load
/// still in flight.
#[instrument(skip(player))]
pub async fn play_current_item(player: &mut Player) {
    let Some(track) = player.queue.current_item().cloned() else {
        warn!(target: PLAYER_LOG_TARGET, "No current queue item to play.");
        stop_playback(player).await;
        return;
    };
    info!(target: PLAYER_LOG_TARGET, item_id = %track.id, "Starting playback of '{}'.", track.name);

    // Closes the previous track's report session, if any.
    player.reporter.set_track(Some(&track)).await;
    player.position_seconds = 0.0;
    player.duration_seconds = track.duration_seconds();
    player.sync_reporter_queue().await;
    player.publish_metadata(Some(&track));

    let url = match player.jellyfin_client.get_audio_stream_url(&track.id).await {
        Ok(url) => url,
        Err(e) => {
            fail_playback(player, format!("Failed to get stream URL for {}: {}", track.id, e)).await;
            return;
        }
    };

    let token = player.orchestrator.start(url, track.run_time_ticks);
    player.current_token = Some(token);
    // A restart of the same track must still be announced as loading.
    if player.status == PlaybackStatus::Loading {
        player.broadcast_update(InternalPlayerStateUpdate::Loading { item: track });
    } else {
        set_status(player, PlaybackStatus::Loading).await;
    }
}

#[instrument(skip(player, tracks), fields(track_count = tracks.len(), start_index = start_index))]
pub async fn handle_play_tracks(player: &mut Player, tracks: Vec<Track>, start_index: usize) {
    if tracks.is_empty() {
        warn!(target: PLAYER_LOG_TARGET, "PlayTracks: empty track list, clearing queue.");
        handle_clear_queue(player).await;
        return;
    }
    info!(target: PLAYER_LOG_TARGET, "Replacing queue with {} tracks, starting at index {}.", tracks.len(), start_index);
    player.queue.set_queue(tracks, start_index);
    queue_changed(player).await;
    play_current_item(player).await;
}

#[instrument(skip(player, item_ids), fields(item_count = item_ids.len(), start_index = start_index))]
pub async fn handle_play_now(player: &mut Player, item_ids: Vec<String>, start_index: usize) {
    info!(target: PLAYER_LOG_TARGET, "Handling PlayNow command with {} items, starting at index {}.", item_ids.len(), start_index);

    let tracks = match item_fetcher::fetch_tracks(player.jellyfin_client.as_ref(), &item_ids).await {
        Ok(tracks) => tracks,
        Err(e) => {
            player.broadcast_update(InternalPlayerStateUpdate::Error(format!("Failed to fetch item details: {}", e)));
            return;
        }
    };
    if tracks.is_empty() {
        warn!(target: PLAYER_LOG_TARGET, "PlayNow: none of the requested items could be resolved.");
        player.broadcast_update(InternalPlayerStateUpdate::Error("No playable items found".to_string()));
        return;
    }
    handle_play_tracks(player, tracks, start_index).await;
}

// --- Queue edits ---

#[instrument(skip(player, tracks), fields(track_count = tracks.len()))]
pub async fn handle_add_to_queue(player: &mut Player, tracks: Vec<Track>) {
    if tracks.is_empty() {
        return;
    }
    let was_empty = player.queue.is_empty();
    player.queue.add_multiple_to_queue(tracks);
    queue_changed(player).await;

    if was_empty && !player.status.is_active() {
        info!(target: PLAYER_LOG_TARGET, "AddToQueue: Queue was empty, starting playback automatically.");
        play_current_item(player).await;
    }
}

pub async fn handle_insert_at(player: &mut Player, track: Track, index: usize) {
    player.queue.insert_at(track, index);
    queue_changed(player).await;
}

/// Removing the playing track moves playback to whatever becomes current.
#[instrument(skip(player))]
pub async fn handle_remove_at(player: &mut Player, index: usize) -> Option<Track> {
    let was_current = player.queue.current_index() == Some(index);
    let removed = player.queue.remove_at(index)?;
    queue_changed(player).await;

    if was_current && player.status.is_active() {
        if player.queue.is_empty() {
            stop_playback(player).await;
            player.reporter.set_track(None).await;
            player.publish_metadata(None);
        } else {
            play_current_item(player).await;
        }
    }
    Some(removed)
}

pub async fn handle_move_item(player: &mut Player, from: usize, to: usize) -> bool {
    let moved = player.queue.move_item(from, to);
    if moved {
        queue_changed(player).await;
    }
    moved
}

#[instrument(skip(player))]
pub async fn handle_jump_to(player: &mut Player, index: usize) -> Option<Track> {
    let track = player.queue.jump_to(index)?;
    queue_changed(player).await;
    play_current_item(player).await;
    Some(track)
}

#[instrument(skip(player))]
pub async fn handle_clear_queue(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Handling ClearQueue command.");
    stop_playback(player).await;
    player.reporter.set_track(None).await;
    player.queue.clear();
    player.position_seconds = 0.0;
    player.duration_seconds = 0.0;
    player.publish_metadata(None);
    queue_changed(player).await;
}

// --- Transport ---

#[instrument(skip(player))]
pub async fn handle_play_pause_toggle(player: &mut Player) {
    match player.status {
        PlaybackStatus::Playing => handle_pause(player).await,
        PlaybackStatus::Paused => handle_resume(player).await,
        PlaybackStatus::Loading => {
            if player.orchestrator.pause_pending() {
                handle_resume(player).await;
            } else {
                handle_pause(player).await;
            }
        }
        _ => {
            if player.queue.current_item().is_some() {
                play_current_item(player).await;
            } else {
                warn!(target: PLAYER_LOG_TARGET, "PlayPauseToggle: Queue is empty, cannot start playback.");
            }
        }
    }
}

/// A pause while loading is held by the orchestrator and applied once the
/// track starts; the status stays `Loading` until then.
#[instrument(skip(player))]
pub async fn handle_pause(player: &mut Player) {
    match player.status {
        PlaybackStatus::Playing => {
            if player.orchestrator.pause() {
                set_status(player, PlaybackStatus::Paused).await;
            }
        }
        PlaybackStatus::Loading => {
            if player.orchestrator.pause() {
                debug!(target: PLAYER_LOG_TARGET, "Pause recorded for the track being loaded.");
            }
        }
        _ => {}
    }
}

#[instrument(skip(player))]
pub async fn handle_resume(player: &mut Player) {
    match player.status {
        PlaybackStatus::Paused => {
            if player.orchestrator.resume() {
                set_status(player, PlaybackStatus::Playing).await;
            }
        }
        PlaybackStatus::Loading => {
            if player.orchestrator.resume() {
                debug!(target: PLAYER_LOG_TARGET, "Pending pause cancelled.");
            }
        }
        PlaybackStatus::Idle | PlaybackStatus::Stopped | PlaybackStatus::Error(_) => {
            if player.queue.current_item().is_some() {
                play_current_item(player).await;
            }
        }
        PlaybackStatus::Playing => {}
    }
}

#[instrument(skip(player))]
pub async fn handle_stop(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Handling Stop command.");
    stop_playback(player).await;
}

#[instrument(skip(player))]
pub async fn handle_next(player: &mut Player) -> Option<Track> {
    let track = player.queue.next();
    match &track {
        Some(_) => play_current_item(player).await,
        None => info!(target: PLAYER_LOG_TARGET, "Next: Already at end of queue or queue empty."),
    }
    track
}

/// Restarts the current track once it has played past the threshold,
/// otherwise steps back in the queue.
#[instrument(skip(player))]
pub async fn handle_previous(player: &mut Player) -> Option<Track> {
    let restart = matches!(player.status, PlaybackStatus::Playing | PlaybackStatus::Paused)
        && player.position_seconds > player.previous_restart_threshold_secs;
    if restart {
        debug!(target: PLAYER_LOG_TARGET, "Previous: restarting current track.");
        if handle_seek(player, 0.0).await.is_ok() {
            return player.queue.current_item().cloned();
        }
    }
    let track = player.queue.previous();
    match &track {
        Some(_) => play_current_item(player).await,
        None => info!(target: PLAYER_LOG_TARGET, "Previous: Already at start of queue or queue empty."),
    }
    track
}

#[instrument(skip(player))]
pub async fn handle_seek(player: &mut Player, seconds: f64) -> Result<(), AudioError> {
    player.orchestrator.seek(seconds)?;
    player.position_seconds = if player.duration_seconds > 0.0 {
        seconds.min(player.duration_seconds)
    } else {
        seconds
    };
    player.reporter.update_position(player.position_seconds).await;
    broadcast_progress(player);
    Ok(())
}

pub async fn handle_set_volume(player: &mut Player, volume: f32) {
    if !volume.is_finite() {
        warn!(target: PLAYER_LOG_TARGET, "Ignoring non-finite volume {}.", volume);
        return;
    }
    let volume = volume.clamp(0.0, 1.0);
    player.volume = (volume * 100.0).round() as u8;
    if !player.is_muted {
        player.orchestrator.set_volume(volume);
    }
    player.reporter.set_volume(player.volume).await;
    player.broadcast_update(InternalPlayerStateUpdate::VolumeChanged { volume: player.volume, is_muted: player.is_muted });
}

pub async fn handle_set_muted(player: &mut Player, muted: bool) {
    player.is_muted = muted;
    let effective = if muted { 0.0 } else { f32::from(player.volume) / 100.0 };
    player.orchestrator.set_volume(effective);
    player.reporter.set_muted(muted).await;
    player.broadcast_update(InternalPlayerStateUpdate::VolumeChanged { volume: player.volume, is_muted: muted });
}

pub async fn handle_set_shuffle(player: &mut Player, mode: ShuffleMode) {
    player.queue.set_shuffle_mode(mode);
    modes_changed(player).await;
}

pub async fn handle_toggle_shuffle(player: &mut Player) -> ShuffleMode {
    let mode = player.queue.toggle_shuffle_mode();
    info!(target: PLAYER_LOG_TARGET, "Shuffle is now {:?}.", mode);
    modes_changed(player).await;
    mode
}

pub async fn handle_set_repeat(player: &mut Player, mode: RepeatMode) {
    player.queue.set_repeat_mode(mode);
    modes_changed(player).await;
}

pub async fn handle_toggle_repeat(player: &mut Player) -> RepeatMode {
    let mode = player.queue.toggle_repeat_mode();
    info!(target: PLAYER_LOG_TARGET, "Repeat is now {:?}.", mode);
    modes_changed(player).await;
    mode
}

#[instrument(skip(player))]
pub async fn handle_media_intent(player: &mut Player, intent: MediaSessionIntent) {
    match intent {
        MediaSessionIntent::Play => handle_resume(player).await,
        MediaSessionIntent::Pause => handle_pause(player).await,
        MediaSessionIntent::PlayPause => handle_play_pause_toggle(player).await,
        MediaSessionIntent::Next => {
            handle_next(player).await;
        }
        MediaSessionIntent::Previous => {
            handle_previous(player).await;
        }
        MediaSessionIntent::SeekTo(seconds) => {
            if let Err(e) = handle_seek(player, seconds).await {
                warn!(target: PLAYER_LOG_TARGET, "Media session seek rejected: {}", e);
            }
        }
        MediaSessionIntent::Stop => handle_stop(player).await,
    }
}

// --- Transport events ---

fn is_current(player: &Player, token: LoadToken) -> bool {
    player.current_token == Some(token)
}

pub async fn handle_transport_event(player: &mut Player, event: TransportEvent) {
    match event {
        TransportEvent::LoadSettled { token, result } => {
            if !is_current(player, token) {
                trace!(target: PLAYER_LOG_TARGET, ?token, "Ignoring settlement of a stale load.");
                return;
            }
            match result {
                Ok(LoadOutcome::Started) => {
                    if player.status == PlaybackStatus::Loading {
                        set_status(player, PlaybackStatus::Playing).await;
                    }
                }
                Ok(LoadOutcome::StartedPaused) => {
                    if player.status == PlaybackStatus::Loading {
                        // The device did start; the server sees a start, then the pause.
                        set_status(player, PlaybackStatus::Playing).await;
                        set_status(player, PlaybackStatus::Paused).await;
                    }
                }
                Ok(LoadOutcome::Superseded) => {
                    debug!(target: PLAYER_LOG_TARGET, ?token, "Load reported superseded.");
                }
                Err(e) => fail_playback(player, e.to_string()).await,
            }
        }
        TransportEvent::Position(progress) => {
            if !matches!(player.status, PlaybackStatus::Playing | PlaybackStatus::Paused) {
                return;
            }
            player.position_seconds = progress.current_seconds;
            if let Some(total) = progress.total_seconds.filter(|t| *t > 0.0) {
                player.duration_seconds = total;
            }
            player.reporter.update_position(player.position_seconds).await;
            broadcast_progress(player);
        }
        TransportEvent::TrackEnded { token } => {
            if !is_current(player, token) || player.status != PlaybackStatus::Playing {
                trace!(target: PLAYER_LOG_TARGET, ?token, "Ignoring end of a track that is no longer current.");
                return;
            }
            handle_track_finished(player).await;
        }
        TransportEvent::DeviceError(message) => {
            if player.status.is_active() {
                fail_playback(player, message).await;
            } else {
                warn!(target: PLAYER_LOG_TARGET, "Device error while inactive: {}", message);
            }
        }
        TransportEvent::Buffering(buffering) => {
            player.broadcast_update(InternalPlayerStateUpdate::Buffering(buffering));
        }
        TransportEvent::OperationFailed { operation, error } => match operation {
            "play" | "pause" if player.status.is_active() => {
                fail_playback(player, format!("Device {} failed: {}", operation, error)).await;
            }
            _ => warn!(target: PLAYER_LOG_TARGET, "Device {} failed: {}", operation, error),
        },
    }
}

/// Closes the finished track's report and advances, or stops at the end of
/// the queue.
#[instrument(skip(player))]
pub async fn handle_track_finished(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Track finished.");
    player.current_token = None;
    if player.duration_seconds > 0.0 {
        player.position_seconds = player.duration_seconds;
        player.reporter.update_position(player.position_seconds).await;
    }
    player.reporter.finish_track(true).await;

    match player.queue.next() {
        Some(track) => {
            info!(target: PLAYER_LOG_TARGET, item_id = %track.id, "Advancing to index {:?}.", player.queue.current_index());
            queue_changed(player).await;
            play_current_item(player).await;
        }
        None => {
            info!(target: PLAYER_LOG_TARGET, "End of queue reached.");
            player.orchestrator.stop();
            set_status(player, PlaybackStatus::Stopped).await;
        }
    }
}
