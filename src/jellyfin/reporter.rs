use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::jellyfin::api::JellyfinApiContract;
use crate::jellyfin::models::{seconds_to_ticks, Track};
use crate::player::PlaybackStatus;

pub use crate::jellyfin::models_playback::{
    PlaybackProgressReport, PlaybackReportBase, PlaybackStartReport, PlaybackStopReport,
    PlaybackStoppedInfoInner, QueueItem,
};

const REPORTER_LOG_TARGET: &str = "jelly_session::jellyfin::reporter";

/// Queue details included with every report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueContext {
    pub item_ids: Vec<String>,
    pub current_index: Option<usize>,
    pub shuffle_mode: String,
    pub repeat_mode: String,
}

/// Represents the state needed to build playback reports.
#[derive(Debug, Clone)]
pub struct PlaybackStateSnapshot {
    pub track: Option<Track>,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub is_paused: bool,
    pub volume: u8,
    pub is_muted: bool,
    pub queue: QueueContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPhase {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error,
}

impl From<&PlaybackStatus> for ReportPhase {
    fn from(status: &PlaybackStatus) -> Self {
        match status {
            PlaybackStatus::Idle => ReportPhase::Idle,
            PlaybackStatus::Loading => ReportPhase::Loading,
            PlaybackStatus::Playing => ReportPhase::Playing,
            PlaybackStatus::Paused => ReportPhase::Paused,
            PlaybackStatus::Stopped => ReportPhase::Stopped,
            PlaybackStatus::Error(_) => ReportPhase::Error,
        }
    }
}

#[derive(Debug)]
struct ReporterState {
    snapshot: PlaybackStateSnapshot,
    phase: ReportPhase,
    /// A start report went out for the current track and no stop yet.
    started: bool,
}

enum Report {
    Start(PlaybackStartReport),
    Progress(PlaybackProgressReport),
    Stop(PlaybackStopReport),
}

/// Reports playback status to the server.
///
/// Status changes are recorded by the session; the reporter never drives
/// playback. Reports go through one dispatcher task in the order they were
/// produced, and transport failures are logged and dropped.
pub struct JellyfinReporter {
    jellyfin_client: Arc<dyn JellyfinApiContract>,
    state: Arc<TokioMutex<ReporterState>>,
    report_tx: Option<mpsc::UnboundedSender<Report>>,
    dispatcher: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    progress_interval: StdDuration,
}

impl JellyfinReporter {
    /// Creates the reporter and spawns its dispatcher. Must be called from
    /// within a Tokio runtime.
    pub fn new(jellyfin_client: Arc<dyn JellyfinApiContract>, progress_interval: StdDuration) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_reports(jellyfin_client.clone(), report_rx));
        let state = ReporterState {
            snapshot: PlaybackStateSnapshot {
                track: None,
                position_seconds: 0.0,
                duration_seconds: 0.0,
                is_paused: false,
                volume: 100,
                is_muted: false,
                queue: QueueContext::default(),
            },
            phase: ReportPhase::Idle,
            started: false,
        };
        Self {
            jellyfin_client,
            state: Arc::new(TokioMutex::new(state)),
            report_tx: Some(report_tx),
            dispatcher: Some(dispatcher),
            timer: None,
            progress_interval,
        }
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn snapshot(&self) -> PlaybackStateSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    fn send(&self, report: Report) {
        match &self.report_tx {
            Some(tx) => {
                if tx.send(report).is_err() {
                    warn!(target: REPORTER_LOG_TARGET, "Report dispatcher is gone; dropping report.");
                }
            }
            None => trace!(target: REPORTER_LOG_TARGET, "Reporter disposed; dropping report."),
        }
    }

    fn arm_timer(&mut self) {
        if self.is_timer_armed() {
            return;
        }
        let Some(report_tx) = self.report_tx.clone() else {
            return;
        };
        let state = self.state.clone();
        let client = self.jellyfin_client.clone();
        let period = self.progress_interval;
        debug!(target: REPORTER_LOG_TARGET, "Arming progress timer ({:?}).", period);
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = {
                    let guard = state.lock().await;
                    if !matches!(guard.phase, ReportPhase::Playing | ReportPhase::Paused) || !guard.started {
                        continue;
                    }
                    build_report_base(client.as_ref(), &guard.snapshot)
                };
                if let Some(base) = report {
                    if report_tx.send(Report::Progress(PlaybackProgressReport { base })).is_err() {
                        break;
                    }
                }
            }
        }));
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(target: REPORTER_LOG_TARGET, "Disarming progress timer.");
            timer.abort();
        }
    }

    /// Makes `track` the reported track. A previously started track is closed
    /// with a stop report first. Position resets to zero and the duration
    /// comes from the track's tick length.
    #[instrument(skip(self, track), fields(item_id = track.map(|t| t.id.as_str()).unwrap_or_default()))]
    pub async fn set_track(&mut self, track: Option<&Track>) {
        self.finish_track(false).await;
        let mut guard = self.state.lock().await;
        guard.snapshot.track = track.cloned();
        guard.snapshot.position_seconds = 0.0;
        guard.snapshot.duration_seconds = track.map(Track::duration_seconds).unwrap_or(0.0);
        guard.snapshot.is_paused = false;
        guard.phase = ReportPhase::Idle;
        guard.started = false;
    }

    /// Disarms the timer and, if the current track was reported as started,
    /// emits the final stop report with the last known position.
    pub async fn finish_track(&mut self, completed: bool) {
        self.disarm_timer();
        let report = {
            let mut guard = self.state.lock().await;
            if !guard.started {
                return;
            }
            guard.started = false;
            let mut snapshot = guard.snapshot.clone();
            snapshot.is_paused = false;
            build_report_base(self.jellyfin_client.as_ref(), &snapshot)
        };
        if let Some(base) = report {
            self.send(Report::Stop(PlaybackStopReport {
                base,
                playback_stopped_info: PlaybackStoppedInfoInner { played_to_completion: completed },
            }));
        }
    }

    /// Records a playback status transition made by the session.
    #[instrument(skip(self))]
    pub async fn record_status(&mut self, status: &PlaybackStatus) {
        let phase = ReportPhase::from(status);
        match phase {
            ReportPhase::Playing | ReportPhase::Paused => {
                let report = {
                    let mut guard = self.state.lock().await;
                    let previous = guard.phase;
                    guard.phase = phase;
                    guard.snapshot.is_paused = phase == ReportPhase::Paused;
                    if guard.snapshot.track.is_none() {
                        None
                    } else if !guard.started {
                        if phase == ReportPhase::Playing {
                            guard.started = true;
                            let mut snapshot = guard.snapshot.clone();
                            snapshot.is_paused = false;
                            build_report_base(self.jellyfin_client.as_ref(), &snapshot)
                                .map(|base| Report::Start(PlaybackStartReport { base }))
                        } else {
                            None
                        }
                    } else if previous != phase {
                        // Pause flag changed; tell the server right away.
                        build_report_base(self.jellyfin_client.as_ref(), &guard.snapshot)
                            .map(|base| Report::Progress(PlaybackProgressReport { base }))
                    } else {
                        None
                    }
                };
                if let Some(report) = report {
                    self.send(report);
                }
                if self.state.lock().await.started {
                    self.arm_timer();
                }
            }
            ReportPhase::Idle | ReportPhase::Loading => {
                self.disarm_timer();
                self.state.lock().await.phase = phase;
            }
            ReportPhase::Stopped | ReportPhase::Error => {
                self.finish_track(false).await;
                self.state.lock().await.phase = phase;
            }
        }
    }

    pub async fn update_position(&self, position_seconds: f64) {
        if position_seconds.is_finite() && position_seconds >= 0.0 {
            self.state.lock().await.snapshot.position_seconds = position_seconds;
        }
    }

    /// Sets the reported volume, 0-100.
    pub async fn set_volume(&self, volume: u8) {
        self.state.lock().await.snapshot.volume = volume.min(100);
    }

    pub async fn set_muted(&self, muted: bool) {
        self.state.lock().await.snapshot.is_muted = muted;
    }

    pub async fn set_queue_context(&self, queue: QueueContext) {
        self.state.lock().await.snapshot.queue = queue;
    }

    /// Emits the final stop report, closes the dispatcher and waits for it to
    /// drain.
    #[instrument(skip(self))]
    pub async fn dispose(&mut self) {
        self.finish_track(false).await;
        self.report_tx = None;
        if let Some(mut dispatcher) = self.dispatcher.take() {
            let timeout_duration = StdDuration::from_secs(5);
            tokio::select! {
                biased;
                _ = &mut dispatcher => debug!(target: REPORTER_LOG_TARGET, "Report dispatcher drained."),
                _ = tokio::time::sleep(timeout_duration) => {
                    error!(target: REPORTER_LOG_TARGET, "Timeout waiting for report dispatcher after {:?}. Aborting.", timeout_duration);
                    dispatcher.abort();
                }
            }
        }
        info!(target: REPORTER_LOG_TARGET, "Reporter disposed.");
    }
}

impl Drop for JellyfinReporter {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Constructs the base report structure from a state snapshot.
fn build_report_base(client: &dyn JellyfinApiContract, state: &PlaybackStateSnapshot) -> Option<PlaybackReportBase> {
    let track = state.track.as_ref()?;

    let queue_items: Vec<QueueItem> = state.queue.item_ids.iter().enumerate().map(|(idx, id)| QueueItem {
        id: id.clone(),
        playlist_item_id: format!("playlistItem{}", idx),
    }).collect();

    Some(PlaybackReportBase {
        queueable_media_types: vec!["Audio".to_string()],
        can_seek: true,
        item_id: track.id.clone(),
        media_source_id: track.id.clone(),
        position_ticks: seconds_to_ticks(state.position_seconds),
        volume_level: i32::from(state.volume),
        is_paused: state.is_paused,
        is_muted: state.is_muted,
        play_method: "DirectPlay".to_string(),
        play_session_id: client.play_session_id().to_string(),
        run_time_ticks: track.run_time_ticks,
        playlist_index: state.queue.current_index.map(|i| i as i32),
        shuffle_mode: if state.queue.shuffle_mode.is_empty() { "Sorted".to_string() } else { state.queue.shuffle_mode.clone() },
        repeat_mode: if state.queue.repeat_mode.is_empty() { "RepeatNone".to_string() } else { state.queue.repeat_mode.clone() },
        now_playing_queue: queue_items,
    })
}

/// Sends queued reports one at a time. Failures never leave this task.
async fn dispatch_reports(client: Arc<dyn JellyfinApiContract>, mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some(report) = reports.recv().await {
        match report {
            Report::Start(report) => match client.report_playback_start(&report).await {
                Ok(()) => info!(target: REPORTER_LOG_TARGET, item_id = %report.base.item_id, "Reported playback start successfully."),
                Err(e) => error!(target: REPORTER_LOG_TARGET, item_id = %report.base.item_id, "Failed to report playback start: {}", e),
            },
            Report::Progress(report) => match client.report_playback_progress(&report).await {
                Ok(()) => trace!(target: REPORTER_LOG_TARGET, "Reported playback progress successfully."),
                Err(e) if e.is_timeout() => warn!(target: REPORTER_LOG_TARGET, "Timeout reporting progress: {}", e),
                Err(e) => error!(target: REPORTER_LOG_TARGET, "Failed to report playback progress: {}", e),
            },
            Report::Stop(report) => match client.report_playback_stopped(&report).await {
                Ok(()) => info!(
                    target: REPORTER_LOG_TARGET,
                    item_id = %report.base.item_id,
                    "Reported playback stop successfully (completed: {}).",
                    report.playback_stopped_info.played_to_completion
                ),
                Err(e) => error!(target: REPORTER_LOG_TARGET, "Failed to report playback stop: {}", e),
            },
        }
    }
    debug!(target: REPORTER_LOG_TARGET, "Report dispatcher finished.");
}
