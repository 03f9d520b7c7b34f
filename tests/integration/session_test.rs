//! End-to-end session tests over the clock-driven simulated device
//!
//! All tests run on Tokio's paused clock so track lengths of seconds finish
//! instantly.

use crate::test_utils::{media_item, track, RecordingApi, ReportRecord};
use jelly_session::audio::SimulatedDevice;
use jelly_session::config::PlaybackSettings;
use jelly_session::player::{InternalPlayerState, PlaybackSession, PlaybackStatus, SessionError, SessionHandle};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod session_integration_tests {
    use super::*;

    fn device() -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::with_timing(Duration::from_millis(50), Duration::from_millis(20)))
    }

    async fn wait_for_status(handle: &SessionHandle, status: PlaybackStatus, limit: Duration) -> InternalPlayerState {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let state = handle.get_state().await.unwrap();
            if state.status == status {
                return state;
            }
            assert!(tokio::time::Instant::now() < deadline, "status {:?} never reached, last {:?}", status, state);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn without_progress(reports: Vec<ReportRecord>) -> Vec<ReportRecord> {
        reports.into_iter().filter(|r| !matches!(r, ReportRecord::Progress { .. })).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_plays_through_and_reports() {
        let api = Arc::new(RecordingApi::default());
        let session = PlaybackSession::create(api.clone(), device(), &PlaybackSettings::default());
        let handle = session.handle();

        handle.play_tracks(vec![track("a", 2), track("b", 2)], 0).await.unwrap();
        wait_for_status(&handle, PlaybackStatus::Playing, Duration::from_secs(1)).await;
        let state = wait_for_status(&handle, PlaybackStatus::Stopped, Duration::from_secs(10)).await;
        assert_eq!(state.current_queue_index, Some(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            without_progress(api.reports()),
            vec![
                ReportRecord::Start { item_id: "a".to_string(), position_ticks: 0 },
                ReportRecord::Stop { item_id: "a".to_string(), position_ticks: 20_000_000, completed: true },
                ReportRecord::Start { item_id: "b".to_string(), position_ticks: 0 },
                ReportRecord::Stop { item_id: "b".to_string(), position_ticks: 20_000_000, completed: true },
            ]
        );

        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_progress_reports() {
        let api = Arc::new(RecordingApi::default());
        let session = PlaybackSession::create(api.clone(), device(), &PlaybackSettings::default());
        let handle = session.handle();

        handle.play_tracks(vec![track("long", 25)], 0).await.unwrap();
        wait_for_status(&handle, PlaybackStatus::Stopped, Duration::from_secs(40)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let progress: Vec<i64> = api
            .reports()
            .into_iter()
            .filter_map(|r| match r {
                ReportRecord::Progress { position_ticks, is_paused: false, .. } => Some(position_ticks),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 2, "expected reports near 10s and 20s: {:?}", progress);
        assert!((90_000_000..=105_000_000).contains(&progress[0]), "first report at {}", progress[0]);
        assert!((190_000_000..=205_000_000).contains(&progress[1]), "second report at {}", progress[1]);

        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_position_and_reports_flag() {
        let api = Arc::new(RecordingApi::default());
        let session = PlaybackSession::create(api.clone(), device(), &PlaybackSettings::default());
        let handle = session.handle();

        handle.play_tracks(vec![track("a", 60)], 0).await.unwrap();
        wait_for_status(&handle, PlaybackStatus::Playing, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        handle.pause().await.unwrap();
        let paused = wait_for_status(&handle, PlaybackStatus::Paused, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let still = handle.get_state().await.unwrap();
        assert_eq!(still.status, PlaybackStatus::Paused);
        assert!((still.position_seconds - paused.position_seconds).abs() < 0.5);

        handle.resume().await.unwrap();
        wait_for_status(&handle, PlaybackStatus::Playing, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports = api.reports();
        assert!(reports.iter().any(|r| matches!(r, ReportRecord::Progress { is_paused: true, .. })));
        assert!(matches!(reports.last(), Some(ReportRecord::Progress { is_paused: false, .. })));

        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_position_follows_playback() {
        let api = Arc::new(RecordingApi::default());
        let session = PlaybackSession::create(api, device(), &PlaybackSettings::default());
        let handle = session.handle();
        let position = handle.media_position();

        handle.play_tracks(vec![track("a", 60)], 0).await.unwrap();
        wait_for_status(&handle, PlaybackStatus::Playing, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let published = *position.borrow();
        let state = handle.get_state().await.unwrap();
        assert!(published.current_seconds > 3.0);
        assert!((state.position_seconds - published.current_seconds).abs() <= 1.5);
        assert_eq!(published.total_seconds, Some(60.0));

        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporting_outage_keeps_playing() {
        let api = Arc::new(RecordingApi::default());
        api.set_failing(true);
        let session = PlaybackSession::create(api.clone(), device(), &PlaybackSettings::default());
        let handle = session.handle();

        handle.play_tracks(vec![track("a", 3), track("b", 3)], 0).await.unwrap();
        let state = wait_for_status(&handle, PlaybackStatus::Stopped, Duration::from_secs(15)).await;
        assert_eq!(state.current_queue_index, Some(1));
        assert_eq!(without_progress(api.reports()).len(), 4);

        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_items_and_dispose() {
        let api = Arc::new(RecordingApi::with_items(vec![media_item("x", 30), media_item("y", 30)]));
        let session = PlaybackSession::create(api.clone(), device(), &PlaybackSettings::default());
        let handle = session.handle();
        let metadata = handle.media_metadata();

        handle.play_items(vec!["y".to_string(), "x".to_string()], 0).await.unwrap();
        let state = wait_for_status(&handle, PlaybackStatus::Playing, Duration::from_secs(1)).await;
        assert_eq!(state.queue_ids, vec!["y", "x"]);
        assert_eq!(metadata.borrow().as_ref().map(|m| m.title.clone()), Some("Track y".to_string()));
        assert_eq!(metadata.borrow().as_ref().and_then(|m| m.artist.clone()), Some("Artist".to_string()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        session.dispose().await;

        assert!(matches!(
            api.reports().last(),
            Some(ReportRecord::Stop { item_id, completed: false, .. }) if item_id == "y"
        ));
        assert_eq!(handle.next().await, Err(SessionError::Closed));
        assert_eq!(handle.get_state().await, Err(SessionError::Closed));
    }
}
