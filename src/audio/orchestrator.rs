// src/audio/orchestrator.rs
//! Sole owner of the audio device.
//!
//! Every device call goes through one runner task that executes requests
//! strictly in issue order. Track loads are tagged with a [`LoadToken`]; a new
//! load publishes a newer token, and any work for an older token is abandoned
//! at its next resumption point instead of touching the device or the state.

use crate::audio::{
    error::AudioError,
    playback::{AudioPlaybackControl, DeviceEvent},
    progress::PlaybackProgressInfo,
    throttle::RateLimiter,
};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

const LOG_TARGET: &str = "jelly_session::audio::orchestrator";

/// Identifies one track load. Only the newest token may reach `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadToken(u64);

/// How a load attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The track loaded and the device is playing it.
    Started,
    /// The track loaded and started, then paused for a pause requested
    /// while it was loading.
    StartedPaused,
    /// A newer load took over; the attempt was dropped without side effects.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportState {
    Idle,
    /// `pause_requested` is applied right after the device starts playing.
    Loading { token: LoadToken, pause_requested: bool },
    Playing(LoadToken),
    Paused(LoadToken),
    Stopped,
    Errored(String),
}

impl TransportState {
    pub fn token(&self) -> Option<LoadToken> {
        match self {
            TransportState::Loading { token, .. } => Some(*token),
            TransportState::Playing(t) | TransportState::Paused(t) => Some(*t),
            _ => None,
        }
    }
}

/// Events the orchestrator reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The load/play sequence for `token` finished.
    LoadSettled { token: LoadToken, result: Result<LoadOutcome, AudioError> },
    /// Throttled position sample.
    Position(PlaybackProgressInfo),
    /// The track for `token` played to its end. Sent at most once per token.
    TrackEnded { token: LoadToken },
    DeviceError(String),
    Buffering(bool),
    /// A queued pause/resume/seek/volume request failed at the device.
    OperationFailed { operation: &'static str, error: AudioError },
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Position samples per second forwarded as `TransportEvent::Position`.
    pub ui_updates_per_sec: u32,
    /// Position samples per second published for OS media integration.
    pub media_session_updates_per_sec: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ui_updates_per_sec: 4,
            media_session_updates_per_sec: 1,
        }
    }
}

type LoadReply = oneshot::Sender<Result<LoadOutcome, AudioError>>;

enum DeviceRequest {
    Load { token: LoadToken, url: String, duration_ticks: Option<i64>, reply: LoadReply },
    Play { token: LoadToken, reply: Option<LoadReply> },
    Pause,
    Seek(f64),
    SetVolume(f32),
}

impl DeviceRequest {
    fn name(&self) -> &'static str {
        match self {
            DeviceRequest::Load { .. } => "load",
            DeviceRequest::Play { .. } => "play",
            DeviceRequest::Pause => "pause",
            DeviceRequest::Seek(_) => "seek",
            DeviceRequest::SetVolume(_) => "set_volume",
        }
    }
}

pub struct PlaybackOrchestrator {
    device: Arc<dyn AudioPlaybackControl>,
    request_tx: Option<mpsc::UnboundedSender<DeviceRequest>>,
    generation: watch::Sender<u64>,
    state: Arc<watch::Sender<TransportState>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    media_position: watch::Receiver<PlaybackProgressInfo>,
    runner: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    load_task: Option<JoinHandle<()>>,
}

impl PlaybackOrchestrator {
    /// Takes ownership of `device` and spawns the request runner and the device
    /// event pump. Must be called from within a Tokio runtime.
    pub fn new(
        device: Arc<dyn AudioPlaybackControl>,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (generation, generation_rx) = watch::channel(0u64);
        let (state, _) = watch::channel(TransportState::Idle);
        let state = Arc::new(state);
        let (media_tx, media_position) = watch::channel(PlaybackProgressInfo::default());

        let runner = tokio::spawn(run_device_requests(
            device.clone(),
            request_rx,
            generation_rx,
            events_tx.clone(),
        ));
        let pump = tokio::spawn(pump_device_events(
            device.subscribe(),
            events_tx.clone(),
            state.clone(),
            media_tx,
            config,
        ));
        info!(target: LOG_TARGET, "Playback orchestrator started.");

        let orchestrator = PlaybackOrchestrator {
            device,
            request_tx: Some(request_tx),
            generation,
            state,
            events_tx,
            media_position,
            runner: Some(runner),
            pump: Some(pump),
            load_task: None,
        };
        (orchestrator, events_rx)
    }

    fn mint_token(&self) -> LoadToken {
        let next = *self.generation.borrow() + 1;
        self.generation.send_replace(next);
        LoadToken(next)
    }

    fn enqueue(&self, request: DeviceRequest) {
        let name = request.name();
        let sent = match &self.request_tx {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        };
        if !sent {
            warn!(target: LOG_TARGET, "Device runner closed; dropping {} request.", name);
        }
    }

    pub fn state(&self) -> TransportState {
        self.state.borrow().clone()
    }

    /// True while a load is in flight with a pause waiting behind it.
    pub fn pause_pending(&self) -> bool {
        matches!(*self.state.borrow(), TransportState::Loading { pause_requested: true, .. })
    }

    /// Position published at the media-session cadence.
    pub fn media_position(&self) -> watch::Receiver<PlaybackProgressInfo> {
        self.media_position.clone()
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        *self.generation.borrow() == token.0
    }

    /// Starts loading `url`, superseding any load still in flight. The outcome
    /// arrives later as `TransportEvent::LoadSettled` carrying the returned token.
    #[instrument(skip(self, url), fields(duration_ticks = ?duration_ticks))]
    pub fn start(&mut self, url: String, duration_ticks: Option<i64>) -> LoadToken {
        let token = self.mint_token();
        self.state.send_replace(TransportState::Loading { token, pause_requested: false });
        debug!(target: LOG_TARGET, ?token, "Starting load.");

        let request_tx = self.request_tx.clone();
        let state = self.state.clone();
        let events_tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            let mut started_paused = false;
            let mut result = match &request_tx {
                Some(tx) => load_then_play(tx, token, url, duration_ticks).await,
                None => Err(AudioError::RunnerClosed),
            };

            match &result {
                Ok(LoadOutcome::Started) => {
                    let mut pause_after_play = false;
                    let promoted = state.send_if_modified(|s| match *s {
                        TransportState::Loading { token: t, pause_requested } if t == token => {
                            pause_after_play = pause_requested;
                            *s = if pause_requested {
                                TransportState::Paused(token)
                            } else {
                                TransportState::Playing(token)
                            };
                            true
                        }
                        _ => false,
                    });
                    if !promoted {
                        trace!(target: LOG_TARGET, ?token, "Load finished after state moved on.");
                    } else if pause_after_play {
                        debug!(target: LOG_TARGET, ?token, "Applying pause requested during load.");
                        // Queued behind the play that just completed.
                        if let Some(tx) = &request_tx {
                            let _ = tx.send(DeviceRequest::Pause);
                        }
                        started_paused = true;
                    }
                }
                Ok(LoadOutcome::StartedPaused) => {}
                Ok(LoadOutcome::Superseded) => {
                    debug!(target: LOG_TARGET, ?token, "Load superseded by a newer request.");
                }
                Err(e) => {
                    error!(target: LOG_TARGET, ?token, "Load failed: {}", e);
                    state.send_if_modified(|s| match *s {
                        TransportState::Loading { token: t, .. } if t == token => {
                            *s = TransportState::Errored(e.to_string());
                            true
                        }
                        _ => false,
                    });
                }
            }
            if started_paused {
                result = Ok(LoadOutcome::StartedPaused);
            }
            let _ = events_tx.send(TransportEvent::LoadSettled { token, result });
        });
        self.load_task = Some(handle);
        token
    }

    /// Pauses if playing. While loading, the pause is recorded and runs after
    /// the play that ends the load. Returns whether a pause was issued or recorded.
    pub fn pause(&self) -> bool {
        match self.state() {
            TransportState::Playing(token) => {
                self.state.send_replace(TransportState::Paused(token));
                self.enqueue(DeviceRequest::Pause);
                true
            }
            TransportState::Loading { token, .. } => {
                self.state.send_replace(TransportState::Loading { token, pause_requested: true });
                true
            }
            _ => false,
        }
    }

    /// Resumes if paused, or drops a pause still waiting on a load. Returns
    /// whether anything changed.
    pub fn resume(&self) -> bool {
        match self.state() {
            TransportState::Paused(token) => {
                self.state.send_replace(TransportState::Playing(token));
                self.enqueue(DeviceRequest::Play { token, reply: None });
                true
            }
            TransportState::Loading { token, pause_requested: true } => {
                self.state.send_replace(TransportState::Loading { token, pause_requested: false });
                true
            }
            _ => false,
        }
    }

    pub fn seek(&self, seconds: f64) -> Result<(), AudioError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(AudioError::InvalidSeek(seconds));
        }
        if self.state().token().is_none() {
            return Err(AudioError::InvalidState("No track loaded".to_string()));
        }
        self.enqueue(DeviceRequest::Seek(seconds));
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.enqueue(DeviceRequest::SetVolume(volume));
    }

    /// Invalidates any in-flight load and pauses the device.
    pub fn stop(&self) {
        let superseded = self.mint_token();
        trace!(target: LOG_TARGET, ?superseded, "Stop minted a fresh generation.");
        self.state.send_replace(TransportState::Stopped);
        self.enqueue(DeviceRequest::Pause);
    }

    /// Records an asynchronous device failure reported by the owner.
    pub fn mark_errored(&self, message: String) {
        self.state.send_replace(TransportState::Errored(message));
    }

    /// Stops playback, drains the runner and shuts the device down.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        info!(target: LOG_TARGET, "Shutting down playback orchestrator...");
        self.stop();
        if let Some(load_task) = self.load_task.take() {
            load_task.abort();
        }
        // Closing the request channel lets the runner finish queued requests and exit.
        self.request_tx = None;
        if let Some(runner) = self.runner.take() {
            await_task(runner, "device runner").await;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        match self.device.shutdown().await {
            Ok(()) => info!(target: LOG_TARGET, "Audio device shutdown successful."),
            Err(e) => error!(target: LOG_TARGET, "Error shutting down audio device: {}", e),
        }
    }
}

impl Drop for PlaybackOrchestrator {
    fn drop(&mut self) {
        for handle in [self.runner.take(), self.pump.take(), self.load_task.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Waits for a task with a timeout, aborting it if it does not finish.
async fn await_task(mut handle: JoinHandle<()>, name: &str) {
    let timeout_duration = StdDuration::from_secs(5);
    tokio::select! {
        biased;
        result = &mut handle => {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(target: LOG_TARGET, "{} panicked: {:?}", name, e);
                }
            }
        }
        _ = tokio::time::sleep(timeout_duration) => {
            error!(target: LOG_TARGET, "Timeout waiting for {} after {:?}. Aborting task.", name, timeout_duration);
            handle.abort();
        }
    }
}

async fn request_reply(
    tx: &mpsc::UnboundedSender<DeviceRequest>,
    build: impl FnOnce(LoadReply) -> DeviceRequest,
) -> Result<LoadOutcome, AudioError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(build(reply_tx)).map_err(|_| AudioError::RunnerClosed)?;
    reply_rx.await.map_err(|_| AudioError::RunnerClosed)?
}

async fn load_then_play(
    tx: &mpsc::UnboundedSender<DeviceRequest>,
    token: LoadToken,
    url: String,
    duration_ticks: Option<i64>,
) -> Result<LoadOutcome, AudioError> {
    let loaded = request_reply(tx, |reply| DeviceRequest::Load { token, url, duration_ticks, reply }).await?;
    if loaded == LoadOutcome::Superseded {
        return Ok(LoadOutcome::Superseded);
    }
    request_reply(tx, |reply| DeviceRequest::Play { token, reply: Some(reply) }).await
}

fn is_current(generation: &watch::Receiver<u64>, token: LoadToken) -> bool {
    *generation.borrow() == token.0
}

/// Resolves once a generation other than `token` is published.
async fn superseded(generation: &mut watch::Receiver<u64>, token: LoadToken) {
    loop {
        if *generation.borrow_and_update() != token.0 {
            return;
        }
        if generation.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Executes device requests one at a time, in the order they were sent.
async fn run_device_requests(
    device: Arc<dyn AudioPlaybackControl>,
    mut requests: mpsc::UnboundedReceiver<DeviceRequest>,
    generation: watch::Receiver<u64>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    debug!(target: LOG_TARGET, "Device runner started.");
    while let Some(request) = requests.recv().await {
        let operation = request.name();
        trace!(target: LOG_TARGET, operation, "Executing device request.");
        match request {
            DeviceRequest::Load { token, url, duration_ticks, reply } => {
                let result = if !is_current(&generation, token) {
                    Ok(LoadOutcome::Superseded)
                } else {
                    let mut watcher = generation.clone();
                    let loaded = tokio::select! {
                        res = device.load(&url, duration_ticks) => res.map(|()| LoadOutcome::Started),
                        _ = superseded(&mut watcher, token) => Ok(LoadOutcome::Superseded),
                    };
                    // A failure for a load nobody wants any more is not reported.
                    if is_current(&generation, token) { loaded } else { Ok(LoadOutcome::Superseded) }
                };
                let _ = reply.send(result);
            }
            DeviceRequest::Play { token, reply } => {
                let result = if !is_current(&generation, token) {
                    Ok(LoadOutcome::Superseded)
                } else {
                    match device.play().await {
                        Ok(()) if is_current(&generation, token) => Ok(LoadOutcome::Started),
                        Ok(()) => {
                            debug!(target: LOG_TARGET, ?token, "Superseded while starting playback; pausing.");
                            if let Err(e) = device.pause().await {
                                warn!(target: LOG_TARGET, "Pause after superseded play failed: {}", e);
                            }
                            Ok(LoadOutcome::Superseded)
                        }
                        Err(_) if !is_current(&generation, token) => Ok(LoadOutcome::Superseded),
                        Err(e) => Err(e),
                    }
                };
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(error) = result {
                            let _ = events_tx.send(TransportEvent::OperationFailed { operation, error });
                        }
                    }
                }
            }
            DeviceRequest::Pause => {
                if let Err(error) = device.pause().await {
                    let _ = events_tx.send(TransportEvent::OperationFailed { operation, error });
                }
            }
            DeviceRequest::Seek(seconds) => {
                if let Err(error) = device.seek(seconds).await {
                    let _ = events_tx.send(TransportEvent::OperationFailed { operation, error });
                }
            }
            DeviceRequest::SetVolume(volume) => {
                if let Err(error) = device.set_volume(volume).await {
                    let _ = events_tx.send(TransportEvent::OperationFailed { operation, error });
                }
            }
        }
    }
    debug!(target: LOG_TARGET, "Device runner finished.");
}

/// Forwards device events: throttles positions, de-duplicates `Ended`.
async fn pump_device_events(
    mut device_rx: broadcast::Receiver<DeviceEvent>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<watch::Sender<TransportState>>,
    media_tx: watch::Sender<PlaybackProgressInfo>,
    config: OrchestratorConfig,
) {
    let mut ui_limiter = RateLimiter::per_second(config.ui_updates_per_sec);
    let mut media_limiter = RateLimiter::per_second(config.media_session_updates_per_sec);
    let mut last_ended: Option<LoadToken> = None;

    loop {
        let deadline = match (ui_limiter.deadline(), media_limiter.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            received = device_rx.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(target: LOG_TARGET, skipped, "Device event receiver lagged.");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match event {
                    DeviceEvent::TimeUpdate(progress) => {
                        let now = Instant::now();
                        if let Some(p) = ui_limiter.offer(progress, now) {
                            let _ = events_tx.send(TransportEvent::Position(p));
                        }
                        if let Some(p) = media_limiter.offer(progress, now) {
                            media_tx.send_replace(p);
                        }
                    }
                    DeviceEvent::Ended => {
                        let current = state.borrow().clone();
                        match current {
                            TransportState::Playing(token) if last_ended != Some(token) => {
                                last_ended = Some(token);
                                debug!(target: LOG_TARGET, ?token, "Track ended.");
                                let _ = events_tx.send(TransportEvent::TrackEnded { token });
                            }
                            other => {
                                debug!(target: LOG_TARGET, state = ?other, "Ignoring duplicate or stale end-of-track notification.");
                            }
                        }
                    }
                    DeviceEvent::Error(message) => {
                        error!(target: LOG_TARGET, "Device reported error: {}", message);
                        if state.borrow().token().is_some() {
                            state.send_replace(TransportState::Errored(message.clone()));
                        }
                        let _ = events_tx.send(TransportEvent::DeviceError(message));
                    }
                    DeviceEvent::Loading(loading) => {
                        if loading {
                            // Pending samples belong to the previous stream.
                            ui_limiter.reset();
                            media_limiter.reset();
                        }
                        let _ = events_tx.send(TransportEvent::Buffering(loading));
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let now = Instant::now();
                if let Some(p) = ui_limiter.poll_due(now) {
                    let _ = events_tx.send(TransportEvent::Position(p));
                }
                if let Some(p) = media_limiter.poll_due(now) {
                    media_tx.send_replace(p);
                }
            }
        }
    }
    debug!(target: LOG_TARGET, "Device event pump finished.");
}
