// src/audio/simulated.rs
//! Clock-driven stand-in for a real output device.
//!
//! Nothing is fetched or decoded: "playing" advances a position against the
//! Tokio clock, emits frequent time updates and reports the end of the track
//! once the position reaches the duration supplied at load time.

use crate::audio::{
    error::AudioError,
    playback::{AudioPlaybackControl, DeviceEvent},
    progress::PlaybackProgressInfo,
};
use crate::jellyfin::models::ticks_to_seconds;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

const LOG_TARGET: &str = "jelly_session::audio::simulated";

#[derive(Debug, Default)]
struct SimState {
    loaded: bool,
    playing: bool,
    position: f64,
    duration: Option<f64>,
    volume: f32,
}

pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<DeviceEvent>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: StdDuration,
    load_delay: StdDuration,
}

impl SimulatedDevice {
    /// Device ticking at ~60 updates/sec with a short simulated buffering delay.
    pub fn new() -> Self {
        Self::with_timing(StdDuration::from_millis(16), StdDuration::from_millis(150))
    }

    pub fn with_timing(tick_interval: StdDuration, load_delay: StdDuration) -> Self {
        let (events, _) = broadcast::channel(256);
        SimulatedDevice {
            state: Arc::new(Mutex::new(SimState { volume: 1.0, ..SimState::default() })),
            events,
            ticker: Mutex::new(None),
            tick_interval,
            load_delay,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>, AudioError> {
        self.state
            .lock()
            .map_err(|_| AudioError::InvalidState("Simulated device state poisoned".to_string()))
    }

    fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn ensure_ticker(&self) {
        let mut guard = match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(last).as_secs_f64();
                last = now;

                let (progress, ended) = {
                    let mut s = match state.lock() {
                        Ok(s) => s,
                        Err(_) => break,
                    };
                    if !s.playing {
                        continue;
                    }
                    s.position += elapsed;
                    let ended = matches!(s.duration, Some(d) if d > 0.0 && s.position >= d);
                    if ended {
                        s.position = s.duration.unwrap_or(s.position);
                        s.playing = false;
                    }
                    (PlaybackProgressInfo::new(s.position, s.duration), ended)
                };
                let _ = events.send(DeviceEvent::TimeUpdate(progress));
                if ended {
                    trace!(target: LOG_TARGET, "Simulated stream reached its end.");
                    let _ = events.send(DeviceEvent::Ended);
                }
            }
        }));
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPlaybackControl for SimulatedDevice {
    async fn load(&self, url: &str, total_duration_ticks: Option<i64>) -> Result<(), AudioError> {
        if url.is_empty() {
            return Err(AudioError::StreamError("Empty stream URL".to_string()));
        }
        debug!(target: LOG_TARGET, "Loading simulated stream.");
        {
            let mut s = self.lock()?;
            s.playing = false;
            s.loaded = false;
        }
        self.emit(DeviceEvent::Loading(true));
        tokio::time::sleep(self.load_delay).await;
        {
            let mut s = self.lock()?;
            s.loaded = true;
            s.position = 0.0;
            s.duration = total_duration_ticks.map(ticks_to_seconds);
        }
        self.emit(DeviceEvent::Loading(false));
        Ok(())
    }

    async fn play(&self) -> Result<(), AudioError> {
        {
            let mut s = self.lock()?;
            if !s.loaded {
                return Err(AudioError::PlaybackError("Nothing loaded".to_string()));
            }
            s.playing = true;
        }
        self.ensure_ticker();
        Ok(())
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.lock()?.playing = false;
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<(), AudioError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(AudioError::InvalidSeek(seconds));
        }
        let progress = {
            let mut s = self.lock()?;
            s.position = match s.duration {
                Some(d) => seconds.min(d),
                None => seconds,
            };
            PlaybackProgressInfo::new(s.position, s.duration)
        };
        self.emit(DeviceEvent::TimeUpdate(progress));
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.lock()?.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn current_time(&self) -> f64 {
        self.lock().map(|s| s.position).unwrap_or(0.0)
    }

    async fn duration(&self) -> Option<f64> {
        self.lock().ok().and_then(|s| s.duration)
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> Result<(), AudioError> {
        info!(target: LOG_TARGET, "Shutting down simulated device.");
        let handle = match self.ticker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        let mut s = self.lock()?;
        s.playing = false;
        s.loaded = false;
        Ok(())
    }
}
