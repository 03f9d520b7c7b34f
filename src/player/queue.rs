// src/player/queue.rs
//! Ordered play queue with a current-position pointer and shuffle/repeat state.
//!
//! The queue does no I/O. Out-of-range operations are not errors: they return
//! `None` or `false` and leave the queue untouched.

use crate::jellyfin::models::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{trace, warn};

const LOG_TARGET: &str = "jelly_session::player::queue";

/// How `next`/`previous` behave at the queue boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    /// Cycles off → all → one → off.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }

    /// Wire name used in playback reports.
    pub fn as_report_str(self) -> &'static str {
        match self {
            RepeatMode::Off => "RepeatNone",
            RepeatMode::All => "RepeatAll",
            RepeatMode::One => "RepeatOne",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShuffleMode {
    #[default]
    Off,
    On,
}

impl ShuffleMode {
    pub fn as_report_str(self) -> &'static str {
        match self {
            ShuffleMode::Off => "Sorted",
            ShuffleMode::On => "Shuffle",
        }
    }
}

/// A queue slot. `key` gives every slot its own identity so a track queued
/// twice is still tracked as two entries.
#[derive(Debug, Clone)]
struct Entry {
    key: u64,
    track: Track,
}

#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<Entry>,
    /// Order to restore when shuffle is turned off. Always holds the same
    /// entries as `items`.
    original_order: Vec<Entry>,
    current_index: Option<usize>,
    repeat_mode: RepeatMode,
    shuffle_mode: ShuffleMode,
    next_key: u64,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, track: Track) -> Entry {
        let key = self.next_key;
        self.next_key += 1;
        Entry { key, track }
    }

    fn current_key(&self) -> Option<u64> {
        self.current_index.and_then(|i| self.items.get(i)).map(|e| e.key)
    }

    // --- Accessors ---

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the current track, `None` when the queue is empty.
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.items.get(i)).map(|e| &e.track)
    }

    /// Tracks in playing order.
    pub fn all_items(&self) -> Vec<Track> {
        self.items.iter().map(|e| e.track.clone()).collect()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|e| e.track.id.clone()).collect()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    // --- Contents ---

    /// Replaces the queue. `start_index` is clamped into range. With shuffle
    /// on, the new contents are shuffled around the start track.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize) {
        self.set_queue_with_rng(tracks, start_index, &mut rand::thread_rng());
    }

    pub fn set_queue_with_rng<R: Rng + ?Sized>(&mut self, tracks: Vec<Track>, start_index: usize, rng: &mut R) {
        let entries: Vec<Entry> = tracks.into_iter().map(|t| self.entry(t)).collect();
        self.original_order = entries.clone();
        self.items = entries;
        self.current_index = if self.items.is_empty() {
            None
        } else {
            Some(start_index.min(self.items.len() - 1))
        };
        if self.shuffle_mode == ShuffleMode::On {
            self.shuffle_around_current(rng);
        }
        trace!(target: LOG_TARGET, len = self.items.len(), current = ?self.current_index, "Queue replaced.");
    }

    pub fn add_to_queue(&mut self, track: Track) {
        self.add_multiple_to_queue(vec![track]);
    }

    /// Appends tracks. If the queue was empty the first new track becomes current.
    pub fn add_multiple_to_queue(&mut self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        let was_empty = self.items.is_empty();
        for track in tracks {
            let entry = self.entry(track);
            self.original_order.push(entry.clone());
            self.items.push(entry);
        }
        if was_empty {
            self.current_index = Some(0);
        }
    }

    /// Inserts `track` at `index` (clamped to `[0, len]`), keeping the current
    /// track current.
    pub fn insert_at(&mut self, track: Track, index: usize) {
        let index = index.min(self.items.len());
        let entry = self.entry(track);
        match self.shuffle_mode {
            ShuffleMode::Off => self.original_order.insert(index, entry.clone()),
            ShuffleMode::On => self.original_order.push(entry.clone()),
        }
        self.items.insert(index, entry);
        self.current_index = match self.current_index {
            None => Some(0),
            Some(current) if index <= current => Some(current + 1),
            Some(current) => Some(current),
        };
    }

    /// Removes and returns the track at `index`, or `None` if out of bounds.
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.original_order.retain(|e| e.key != removed.key);

        self.current_index = match self.current_index {
            _ if self.items.is_empty() => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) if current >= self.items.len() => Some(self.items.len() - 1),
            other => other,
        };
        Some(removed.track)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.original_order.clear();
        self.current_index = None;
    }

    // --- Navigation ---

    /// Advances to the next track. Returns `None` at the end with repeat off,
    /// leaving the index where it was.
    pub fn next(&mut self) -> Option<Track> {
        let current = self.current_index?;
        if self.repeat_mode == RepeatMode::One {
            return self.current_item().cloned();
        }
        if current + 1 < self.items.len() {
            self.current_index = Some(current + 1);
        } else if self.repeat_mode == RepeatMode::All {
            self.current_index = Some(0);
        } else {
            return None;
        }
        self.current_item().cloned()
    }

    /// Steps back one track, mirroring `next` at the start boundary.
    pub fn previous(&mut self) -> Option<Track> {
        let current = self.current_index?;
        if self.repeat_mode == RepeatMode::One {
            return self.current_item().cloned();
        }
        if current > 0 {
            self.current_index = Some(current - 1);
        } else if self.repeat_mode == RepeatMode::All {
            self.current_index = Some(self.items.len() - 1);
        } else {
            return None;
        }
        self.current_item().cloned()
    }

    pub fn has_next(&self) -> bool {
        match self.current_index {
            None => false,
            Some(_) if self.repeat_mode != RepeatMode::Off => true,
            Some(current) => current + 1 < self.items.len(),
        }
    }

    pub fn has_previous(&self) -> bool {
        match self.current_index {
            None => false,
            Some(_) if self.repeat_mode != RepeatMode::Off => true,
            Some(current) => current > 0,
        }
    }

    pub fn jump_to(&mut self, index: usize) -> Option<Track> {
        if index >= self.items.len() {
            return None;
        }
        self.current_index = Some(index);
        self.current_item().cloned()
    }

    /// Moves the entry at `from` to `to`. Returns `false` (and does nothing)
    /// when either index is out of bounds or they are equal.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        let entry = self.items.remove(from);
        self.items.insert(to, entry);
        if self.shuffle_mode == ShuffleMode::Off {
            let moved = self.original_order.remove(from);
            self.original_order.insert(to, moved);
        }

        if let Some(current) = self.current_index {
            self.current_index = Some(if from == current {
                to
            } else if from < current && to >= current {
                current - 1
            } else if from > current && to <= current {
                current + 1
            } else {
                current
            });
        }
        true
    }

    // --- Modes ---

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn toggle_repeat_mode(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.cycled();
        self.repeat_mode
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.set_shuffle_mode_with_rng(mode, &mut rand::thread_rng());
    }

    pub fn set_shuffle_mode_with_rng<R: Rng + ?Sized>(&mut self, mode: ShuffleMode, rng: &mut R) {
        if mode == self.shuffle_mode {
            return;
        }
        match mode {
            ShuffleMode::On => {
                self.original_order = self.items.clone();
                self.shuffle_around_current(rng);
            }
            ShuffleMode::Off => self.restore_original_order(),
        }
        self.shuffle_mode = mode;
    }

    pub fn toggle_shuffle_mode(&mut self) -> ShuffleMode {
        self.toggle_shuffle_mode_with_rng(&mut rand::thread_rng())
    }

    pub fn toggle_shuffle_mode_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ShuffleMode {
        let mode = match self.shuffle_mode {
            ShuffleMode::Off => ShuffleMode::On,
            ShuffleMode::On => ShuffleMode::Off,
        };
        self.set_shuffle_mode_with_rng(mode, rng);
        mode
    }

    /// Fisher-Yates over all items, then swap the previously current entry
    /// back into the current slot.
    fn shuffle_around_current<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let current_key = self.current_key();
        self.items.shuffle(rng);
        if let (Some(index), Some(key)) = (self.current_index, current_key) {
            if let Some(pos) = self.items.iter().position(|e| e.key == key) {
                self.items.swap(pos, index);
            }
        }
    }

    fn restore_original_order(&mut self) {
        let current_key = self.current_key();
        self.items = self.original_order.clone();
        self.current_index = match current_key {
            Some(key) => match self.items.iter().position(|e| e.key == key) {
                Some(pos) => Some(pos),
                None => {
                    warn!(target: LOG_TARGET, "Current entry missing from original order; falling back to the first track.");
                    if self.items.is_empty() { None } else { Some(0) }
                }
            },
            None if self.items.is_empty() => None,
            None => Some(0),
        };
    }
}
