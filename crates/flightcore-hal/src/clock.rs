//! Monotonic time sources.
//!
//! Every timeout in the flight core is measured against a [`Clock`] so the
//! protocol engines can run against wall time on hardware and against
//! virtual time in tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time since boot plus a blocking delay.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the calling channel for `duration`.
    fn sleep(&self, duration: Duration);

    /// Uptime in deci-seconds, the resolution used by beacon records.
    fn uptime_deci(&self) -> u32 {
        u32::try_from(self.now().as_millis() / 100).unwrap_or(u32::MAX)
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Wall-clock time backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.boot.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time: `sleep` advances the clock instantly.
///
/// Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
