//! Window clock.
//!
//! # Responsibility
//! - Provide the current time to the scheduler through a swappable source.
//! - Bucket instants into fixed-size windows and derive the flood horizon.
//!
//! # Invariants
//! - `TimeWindow::start_ms` is a multiple of the window size.
//! - `horizon_ms` is exactly `FLOOD_HORIZON_SECONDS` before `start_ms`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Length of the trailing period summed by the flood governor.
pub const FLOOD_HORIZON_SECONDS: u32 = 60;

/// Time source for scheduling decisions.
pub trait Clock: Send + Sync {
    /// Current instant as epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(before_epoch) => {
                -i64::try_from(before_epoch.duration().as_millis()).unwrap_or(i64::MAX)
            }
        }
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

/// One window and the start of its trailing flood horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub horizon_ms: i64,
}

impl TimeWindow {
    /// Returns the window containing `now_ms`.
    ///
    /// `window_size_seconds` must be non-zero; `ThrottleConfig::validate`
    /// guarantees this for configured values.
    pub fn containing(now_ms: i64, window_size_seconds: u32) -> Self {
        let size_ms = i64::from(window_size_seconds.max(1)) * 1000;
        // Saturates at the edges of the representable range.
        let start_ms = now_ms.div_euclid(size_ms).saturating_mul(size_ms);
        Self {
            start_ms,
            horizon_ms: start_ms.saturating_sub(i64::from(FLOOD_HORIZON_SECONDS) * 1000),
        }
    }
}
