// src/player/item_fetcher.rs
use crate::jellyfin::api::{JellyfinApiContract, JellyfinError};
use crate::jellyfin::models::{MediaItem, Track};
use crate::player::PLAYER_LOG_TARGET;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};

/// Fetches item details and returns them as tracks in request order.
/// Ids the server does not return are skipped; a repeated id yields the
/// track once per occurrence.
#[instrument(skip(jellyfin_client, item_ids), fields(id_count = item_ids.len()))]
pub async fn fetch_tracks(
    jellyfin_client: &dyn JellyfinApiContract,
    item_ids: &[String],
) -> Result<Vec<Track>, JellyfinError> {
    if item_ids.is_empty() {
        return Ok(Vec::new());
    }
    info!(target: PLAYER_LOG_TARGET, "Fetching details for {} items...", item_ids.len());
    let media_items = jellyfin_client.get_items_details(item_ids).await.map_err(|e| {
        error!(target: PLAYER_LOG_TARGET, "Failed to fetch item details: {}", e);
        e
    })?;

    let by_id: HashMap<String, MediaItem> = media_items
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect();

    let tracks: Vec<Track> = item_ids
        .iter()
        .filter_map(|id| by_id.get(id).cloned().map(Track::from))
        .collect();

    if tracks.len() < item_ids.len() {
        warn!(target: PLAYER_LOG_TARGET, "Requested {} items but only {} could be resolved.", item_ids.len(), tracks.len());
    }
    Ok(tracks)
}
