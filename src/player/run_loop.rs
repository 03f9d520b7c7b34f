// src/player/run_loop.rs
use super::{command_handler, Player, PlayerCommand, PLAYER_LOG_TARGET};
use tracing::{info, trace};

/// Runs the player's command processing loop.
pub async fn run_player_loop(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Player run loop started.");

    loop {
        tokio::select! {
            biased; // Check commands first

            // --- Command Processing ---
            maybe_command = player.command_rx.recv() => {
                let Some(command) = maybe_command else {
                    info!(target: PLAYER_LOG_TARGET, "Command channel closed. Exiting run loop.");
                    break;
                };
                trace!(target: PLAYER_LOG_TARGET, "Received command: {:?}", command);
                match command {
                    PlayerCommand::PlayTracks { tracks, start_index } => command_handler::handle_play_tracks(player, tracks, start_index).await,
                    PlayerCommand::PlayNow { item_ids, start_index } => command_handler::handle_play_now(player, item_ids, start_index).await,
                    PlayerCommand::AddToQueue { tracks } => command_handler::handle_add_to_queue(player, tracks).await,
                    PlayerCommand::InsertAt { track, index } => command_handler::handle_insert_at(player, track, index).await,
                    PlayerCommand::RemoveAt { index, responder } => {
                        let removed = command_handler::handle_remove_at(player, index).await;
                        let _ = responder.send(removed);
                    }
                    PlayerCommand::MoveItem { from, to, responder } => {
                        let moved = command_handler::handle_move_item(player, from, to).await;
                        let _ = responder.send(moved);
                    }
                    PlayerCommand::JumpTo { index, responder } => {
                        let track = command_handler::handle_jump_to(player, index).await;
                        let _ = responder.send(track);
                    }
                    PlayerCommand::ClearQueue => command_handler::handle_clear_queue(player).await,
                    PlayerCommand::PlayPauseToggle => command_handler::handle_play_pause_toggle(player).await,
                    PlayerCommand::Pause => command_handler::handle_pause(player).await,
                    PlayerCommand::Resume => command_handler::handle_resume(player).await,
                    PlayerCommand::Stop => command_handler::handle_stop(player).await,
                    PlayerCommand::Next(responder) => {
                        let track = command_handler::handle_next(player).await;
                        let _ = responder.send(track);
                    }
                    PlayerCommand::Previous(responder) => {
                        let track = command_handler::handle_previous(player).await;
                        let _ = responder.send(track);
                    }
                    PlayerCommand::Seek { seconds, responder } => {
                        let result = command_handler::handle_seek(player, seconds).await;
                        let _ = responder.send(result);
                    }
                    PlayerCommand::SetVolume(volume) => command_handler::handle_set_volume(player, volume).await,
                    PlayerCommand::SetMuted(muted) => command_handler::handle_set_muted(player, muted).await,
                    PlayerCommand::SetShuffle(mode) => command_handler::handle_set_shuffle(player, mode).await,
                    PlayerCommand::ToggleShuffle(responder) => {
                        let mode = command_handler::handle_toggle_shuffle(player).await;
                        let _ = responder.send(mode);
                    }
                    PlayerCommand::SetRepeat(mode) => command_handler::handle_set_repeat(player, mode).await,
                    PlayerCommand::ToggleRepeat(responder) => {
                        let mode = command_handler::handle_toggle_repeat(player).await;
                        let _ = responder.send(mode);
                    }
                    PlayerCommand::MediaIntent(intent) => command_handler::handle_media_intent(player, intent).await,
                    PlayerCommand::GetFullState(responder) => {
                        let _ = responder.send(player.get_full_state());
                    }
                    PlayerCommand::Shutdown => {
                        info!(target: PLAYER_LOG_TARGET, "Shutdown command received. Exiting run loop.");
                        break;
                    }
                }
            }

            // --- Transport events from the orchestrator ---
            Some(event) = player.transport_rx.recv() => {
                command_handler::handle_transport_event(player, event).await;
            }
        }
    }

    info!(target: PLAYER_LOG_TARGET, "Player run loop finished. Performing final cleanup.");
    command_handler::handle_stop(player).await;
    // Closes any open report session and drains the dispatcher.
    player.reporter.dispose().await;
    player.orchestrator.shutdown().await;
    // Refuse anything still queued so waiting callers see a closed session.
    player.command_rx.close();
    info!(target: PLAYER_LOG_TARGET, "Player task cleanup complete.");
}
