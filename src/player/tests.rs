//! Tests for the playback session facade

use super::*;
use crate::audio::{DeviceEvent, PlaybackProgressInfo};
use crate::jellyfin::models::MediaItem;
use crate::jellyfin::{JellyfinError, PlaybackProgressReport, PlaybackStartReport, PlaybackStopReport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct MockDevice {
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    fail_loads: AtomicBool,
    events: broadcast::Sender<DeviceEvent>,
}

impl MockDevice {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(MockDevice {
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            fail_loads: AtomicBool::new(false),
            events,
        })
    }

    fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioPlaybackControl for MockDevice {
    async fn load(&self, url: &str, _total_duration_ticks: Option<i64>) -> Result<(), AudioError> {
        self.record(format!("load:{}", url));
        let gate = self.gates.lock().unwrap().remove(url);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AudioError::StreamError("unsupported codec".to_string()));
        }
        Ok(())
    }
    async fn play(&self) -> Result<(), AudioError> {
        self.record("play".to_string());
        Ok(())
    }
    async fn pause(&self) -> Result<(), AudioError> {
        self.record("pause".to_string());
        Ok(())
    }
    async fn seek(&self, seconds: f64) -> Result<(), AudioError> {
        self.record(format!("seek:{}", seconds));
        Ok(())
    }
    async fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.record(format!("volume:{}", volume));
        Ok(())
    }
    async fn current_time(&self) -> f64 {
        0.0
    }
    async fn duration(&self) -> Option<f64> {
        None
    }
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
    async fn shutdown(&self) -> Result<(), AudioError> {
        self.record("shutdown".to_string());
        Ok(())
    }
}

#[derive(Default)]
struct MockApi {
    items: Vec<MediaItem>,
    reports: Mutex<Vec<String>>,
    fail_reports: AtomicBool,
    fail_catalog: AtomicBool,
}

impl MockApi {
    fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }

    fn record(&self, entry: String) -> Result<(), JellyfinError> {
        self.reports.lock().unwrap().push(entry);
        if self.fail_reports.load(Ordering::SeqCst) {
            Err(JellyfinError::Other("unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JellyfinApiContract for MockApi {
    fn play_session_id(&self) -> &str {
        "session"
    }
    async fn get_items_details(&self, item_ids: &[String]) -> Result<Vec<MediaItem>, JellyfinError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(JellyfinError::NotFound("catalog offline".to_string()));
        }
        // Reverse order to prove the session restores request order.
        Ok(self.items.iter().rev().filter(|i| item_ids.contains(&i.id)).cloned().collect())
    }
    async fn get_audio_stream_url(&self, item_id: &str) -> Result<String, JellyfinError> {
        Ok(format!("mock://{}", item_id))
    }
    fn get_artwork_url(&self, track: &Track) -> Option<String> {
        track.image_tag.as_ref().map(|tag| format!("art://{}/{}", track.id, tag))
    }
    async fn report_playback_start(&self, report: &PlaybackStartReport) -> Result<(), JellyfinError> {
        self.record(format!("start:{}", report.base.item_id))
    }
    async fn report_playback_progress(&self, report: &PlaybackProgressReport) -> Result<(), JellyfinError> {
        self.record(format!("progress:{}", report.base.item_id))
    }
    async fn report_playback_stopped(&self, report: &PlaybackStopReport) -> Result<(), JellyfinError> {
        self.record(format!(
            "stop:{}:{}",
            report.base.item_id, report.playback_stopped_info.played_to_completion
        ))
    }
}

fn track(id: &str) -> Track {
    Track::new(id, format!("Track {}", id), Some(180 * 10_000_000))
}

fn media_item(id: &str) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        name: format!("Track {}", id),
        media_type: "Audio".to_string(),
        is_folder: false,
        run_time_ticks: Some(60 * 10_000_000),
        album: None,
        album_id: None,
        album_artist: None,
        artists: Vec::new(),
        image_tags: HashMap::new(),
    }
}

fn session_with(api: Arc<MockApi>, device: Arc<MockDevice>) -> PlaybackSession {
    PlaybackSession::create(api, device, &PlaybackSettings::default())
}

/// Polls the session until `check` accepts its state.
async fn wait_for(handle: &SessionHandle, check: impl Fn(&InternalPlayerState) -> bool) -> InternalPlayerState {
    for _ in 0..400 {
        let state = handle.get_state().await.unwrap();
        if check(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached the expected state: {:?}", handle.get_state().await);
}

fn current_id(state: &InternalPlayerState) -> Option<&str> {
    state.current_item.as_ref().map(|t| t.id.as_str())
}

#[tokio::test(start_paused = true)]
async fn test_newer_play_supersedes_pending_load() {
    let device = MockDevice::new();
    let release_a = device.gate("mock://a");
    let session = session_with(Arc::new(MockApi::default()), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    handle.play_tracks(vec![track("b")], 0).await.unwrap();
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    assert_eq!(current_id(&state), Some("b"));

    // A's load finishing late must not pull the session back to A.
    let _ = release_a.send(());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert_eq!(current_id(&state), Some("b"));
    assert!(device.calls().contains(&"load:mock://b".to_string()));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_track_end_advances_once() {
    let device = MockDevice::new();
    let api = Arc::new(MockApi::default());
    let session = session_with(api.clone(), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a"), track("b"), track("c")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    device.emit(DeviceEvent::Ended);
    device.emit(DeviceEvent::Ended);
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Playing && current_id(s) == Some("b")).await;
    assert_eq!(state.current_queue_index, Some(1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.current_queue_index, Some(1));
    assert!(api.reports().contains(&"stop:a:true".to_string()));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_end_of_queue_stops() {
    let device = MockDevice::new();
    let api = Arc::new(MockApi::default());
    let session = session_with(api.clone(), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("only")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    device.emit(DeviceEvent::Ended);
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Stopped).await;
    assert_eq!(state.current_queue_index, Some(0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(api.reports(), vec!["start:only".to_string(), "stop:only:true".to_string()]);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_report_failures_do_not_change_status() {
    let device = MockDevice::new();
    let api = Arc::new(MockApi::default());
    api.fail_reports.store(true, Ordering::SeqCst);
    let session = session_with(api.clone(), device);
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    tokio::time::sleep(Duration::from_secs(21)).await;

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert!(api.reports().iter().filter(|r| r.starts_with("progress")).count() >= 2);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_sets_error() {
    let device = MockDevice::new();
    device.fail_loads.store(true, Ordering::SeqCst);
    let session = session_with(Arc::new(MockApi::default()), device);
    let handle = session.handle();
    let mut updates = handle.subscribe();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    let state = wait_for(&handle, |s| matches!(s.status, PlaybackStatus::Error(_))).await;
    match state.status {
        PlaybackStatus::Error(message) => assert!(message.contains("unsupported codec")),
        other => panic!("unexpected status {:?}", other),
    }

    let mut saw_error = false;
    while let Ok(update) = updates.try_recv() {
        if matches!(update, InternalPlayerStateUpdate::Error(_)) {
            saw_error = true;
        }
    }
    assert!(saw_error);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_loading_applies_after_play() {
    let device = MockDevice::new();
    let release = device.gate("mock://a");
    let api = Arc::new(MockApi::default());
    let session = session_with(api.clone(), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Loading).await;
    handle.pause().await.unwrap();
    assert_eq!(handle.get_state().await.unwrap().status, PlaybackStatus::Loading);

    let _ = release.send(());
    wait_for(&handle, |s| s.status == PlaybackStatus::Paused).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.get_state().await.unwrap().status, PlaybackStatus::Paused);
    assert_eq!(device.calls().last().map(String::as_str), Some("pause"));
    assert_eq!(api.reports(), vec!["start:a", "progress:a"]);

    handle.media_intent(MediaSessionIntent::Play).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let calls = device.calls();
    let transport: Vec<&str> = calls
        .iter()
        .map(String::as_str)
        .filter(|c| *c == "play" || *c == "pause")
        .collect();
    assert_eq!(transport, vec!["play", "pause", "play"]);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_toggle_twice_while_loading_keeps_playing() {
    let device = MockDevice::new();
    let release = device.gate("mock://a");
    let session = session_with(Arc::new(MockApi::default()), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Loading).await;
    handle.play_pause().await.unwrap();
    handle.play_pause().await.unwrap();

    let _ = release.send(());
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.get_state().await.unwrap().status, PlaybackStatus::Playing);
    assert!(!device.calls().contains(&"pause".to_string()));

    handle.media_intent(MediaSessionIntent::Pause).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Paused).await;

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_previous_restarts_after_threshold() {
    let device = MockDevice::new();
    let session = session_with(Arc::new(MockApi::default()), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a"), track("b")], 1).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    device.emit(DeviceEvent::TimeUpdate(PlaybackProgressInfo::new(10.0, Some(180.0))));
    wait_for(&handle, |s| s.position_seconds >= 10.0).await;

    let restarted = handle.previous().await.unwrap();
    assert_eq!(restarted.map(|t| t.id), Some("b".to_string()));
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.position_seconds, 0.0);
    assert_eq!(state.current_queue_index, Some(1));

    let moved = handle.previous().await.unwrap();
    assert_eq!(moved.map(|t| t.id), Some("a".to_string()));
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    assert_eq!(current_id(&state), Some("a"));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_track_navigation_returns_none() {
    let session = session_with(Arc::new(MockApi::default()), MockDevice::new());
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    assert_eq!(handle.next().await.unwrap(), None);
    assert_eq!(handle.previous().await.unwrap(), None);
    assert_eq!(handle.get_state().await.unwrap().current_queue_index, Some(0));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_edits_through_handle() {
    let session = session_with(Arc::new(MockApi::default()), MockDevice::new());
    let handle = session.handle();

    handle.play_tracks(vec![track("t1"), track("t2"), track("t3")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    assert!(handle.move_item(2, 0).await.unwrap());
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.queue_ids, vec!["t3", "t1", "t2"]);
    assert_eq!(state.current_queue_index, Some(1));
    assert!(!handle.move_item(1, 1).await.unwrap());

    // Removing the playing track moves playback to the next one.
    let removed = handle.remove_at(1).await.unwrap();
    assert_eq!(removed.map(|t| t.id), Some("t1".to_string()));
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Playing && current_id(s) == Some("t2")).await;
    assert_eq!(state.queue_ids, vec!["t3", "t2"]);
    assert_eq!(handle.remove_at(9).await.unwrap(), None);

    handle.insert_at(track("t0"), 0).await.unwrap();
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.current_queue_index, Some(2));
    assert_eq!(current_id(&state), Some("t2"));

    assert_eq!(handle.jump_to(7).await.unwrap(), None);
    assert_eq!(handle.jump_to(0).await.unwrap().map(|t| t.id), Some("t0".to_string()));
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing && current_id(s) == Some("t0")).await;

    handle.clear_queue().await.unwrap();
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.status, PlaybackStatus::Stopped);
    assert!(state.queue_ids.is_empty());
    assert_eq!(state.current_queue_index, None);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_toggle_shuffle_keeps_current_track() {
    let session = session_with(Arc::new(MockApi::default()), MockDevice::new());
    let handle = session.handle();
    let tracks: Vec<Track> = (0..8).map(|i| track(&format!("t{}", i))).collect();

    handle.play_tracks(tracks, 3).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    assert_eq!(handle.toggle_shuffle_mode().await.unwrap(), ShuffleMode::On);
    let state = handle.get_state().await.unwrap();
    assert_eq!(current_id(&state), Some("t3"));
    assert_eq!(state.queue_ids[state.current_queue_index.unwrap()], "t3");

    assert_eq!(handle.toggle_shuffle_mode().await.unwrap(), ShuffleMode::Off);
    let state = handle.get_state().await.unwrap();
    let expected: Vec<String> = (0..8).map(|i| format!("t{}", i)).collect();
    assert_eq!(state.queue_ids, expected);
    assert_eq!(state.current_queue_index, Some(3));

    assert_eq!(handle.toggle_repeat_mode().await.unwrap(), RepeatMode::All);
    assert_eq!(handle.toggle_repeat_mode().await.unwrap(), RepeatMode::One);
    assert_eq!(handle.toggle_repeat_mode().await.unwrap(), RepeatMode::Off);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_play_items_keeps_request_order() {
    let api = Arc::new(MockApi {
        items: vec![media_item("x"), media_item("y"), media_item("z")],
        ..MockApi::default()
    });
    let session = session_with(api.clone(), MockDevice::new());
    let handle = session.handle();

    handle
        .play_items(vec!["z".to_string(), "x".to_string(), "missing".to_string()], 0)
        .await
        .unwrap();
    let state = wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    assert_eq!(state.queue_ids, vec!["z", "x"]);
    assert_eq!(current_id(&state), Some("z"));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_catalog_failure_leaves_status() {
    let api = Arc::new(MockApi::default());
    api.fail_catalog.store(true, Ordering::SeqCst);
    let session = session_with(api, MockDevice::new());
    let handle = session.handle();
    let mut updates = handle.subscribe();

    handle.play_items(vec!["x".to_string()], 0).await.unwrap();
    let update = tokio::time::timeout(Duration::from_secs(1), updates.recv()).await.unwrap().unwrap();
    assert!(matches!(update, InternalPlayerStateUpdate::Error(_)));
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.status, PlaybackStatus::Idle);
    assert!(state.queue_ids.is_empty());

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_volume_mute_and_metadata() {
    let device = MockDevice::new();
    let session = session_with(Arc::new(MockApi::default()), device.clone());
    let handle = session.handle();
    let metadata = handle.media_metadata();

    let mut t = track("a");
    t.album = Some("Record".to_string());
    t.artists = vec!["Band".to_string()];
    t.image_tag = Some("p1".to_string());
    handle.play_tracks(vec![t], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    let published = metadata.borrow().clone().unwrap();
    assert_eq!(published.title, "Track a");
    assert_eq!(published.artist.as_deref(), Some("Band"));
    assert_eq!(published.album.as_deref(), Some("Record"));
    assert_eq!(published.artwork_url.as_deref(), Some("art://a/p1"));

    handle.set_volume(0.5).await.unwrap();
    handle.set_muted(true).await.unwrap();
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.volume, 50);
    assert!(state.is_muted);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let calls = device.calls();
    assert!(calls.contains(&"volume:0.5".to_string()));
    assert_eq!(calls.iter().filter(|c| c.starts_with("volume")).last().map(String::as_str), Some("volume:0"));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_seek_validation() {
    let device = MockDevice::new();
    let session = session_with(Arc::new(MockApi::default()), device.clone());
    let handle = session.handle();

    assert!(matches!(handle.seek(5.0).await.unwrap(), Err(AudioError::InvalidState(_))));
    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;

    assert!(matches!(handle.seek(-1.0).await.unwrap(), Err(AudioError::InvalidSeek(_))));
    assert_eq!(handle.seek(500.0).await.unwrap(), Ok(()));
    assert_eq!(handle.get_state().await.unwrap().position_seconds, 180.0);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_calls_after_dispose_are_closed() {
    let device = MockDevice::new();
    let api = Arc::new(MockApi::default());
    let session = session_with(api.clone(), device.clone());
    let handle = session.handle();

    handle.play_tracks(vec![track("a")], 0).await.unwrap();
    wait_for(&handle, |s| s.status == PlaybackStatus::Playing).await;
    session.dispose().await;

    assert_eq!(handle.play_pause().await, Err(SessionError::Closed));
    assert_eq!(handle.get_state().await, Err(SessionError::Closed));
    assert_eq!(device.calls().last().map(String::as_str), Some("shutdown"));
    assert_eq!(api.reports().last().map(String::as_str), Some("stop:a:false"));
}
