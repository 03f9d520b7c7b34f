//! "Latest value, at most N per second" coalescing.
//!
//! The limiter is plain state driven by caller-supplied instants, so any loop
//! can host it: offer samples as they arrive and, while one is pending, wake
//! at [`RateLimiter::deadline`] to release it.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter<T> {
    min_interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
}

impl<T> RateLimiter<T> {
    /// Limiter releasing at most `rate` values per second. A rate of zero is
    /// treated as one.
    pub fn per_second(rate: u32) -> Self {
        Self::with_interval(Duration::from_secs(1) / rate.max(1))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
            pending: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Offers a new sample. Returns it straight away if the interval since the
    /// last release has elapsed; otherwise it replaces any pending sample.
    pub fn offer(&mut self, value: T, now: Instant) -> Option<T> {
        if self.is_open(now) {
            self.pending = None;
            self.last_emit = Some(now);
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// When the pending sample may be released, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(match self.last_emit {
            Some(last) => last + self.min_interval,
            None => Instant::now(),
        })
    }

    /// Releases the pending sample if its deadline has passed.
    pub fn poll_due(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.is_open(now) {
            self.last_emit = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// Forgets the pending sample and the last release time.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_emit = None;
    }

    fn is_open(&self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }
}
