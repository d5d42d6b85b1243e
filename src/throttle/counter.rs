//! Fixed-window request counter.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A counter that tracks hits within a fixed time window.
///
/// The window opens on the first hit and restarts on the first hit after it
/// has elapsed. Reset and increment happen under the window lock, so
/// concurrent callers observe a consistent count.
pub struct WindowCounter {
    /// Hits in the current window
    count: AtomicU64,
    /// Maximum hits allowed in one window
    limit: u64,
    /// Window length
    window: Duration,
    /// When the current window started
    window_start: Mutex<Instant>,
}

impl WindowCounter {
    /// Create a new counter whose first window starts at `now`.
    pub fn new(limit: u64, window: Duration, now: Instant) -> Self {
        Self {
            count: AtomicU64::new(0),
            limit,
            window,
            window_start: Mutex::new(now),
        }
    }

    /// Add `hits` and return the count of the current window afterwards.
    pub fn increment(&self, hits: u32, now: Instant) -> u64 {
        let mut window_start = self.window_start.lock();
        self.reset_if_expired(&mut window_start, now);

        self.count.fetch_add(hits as u64, Ordering::SeqCst) + hits as u64
    }

    /// Hits in the window active at `now`.
    pub fn current_count(&self, now: Instant) -> u64 {
        let mut window_start = self.window_start.lock();
        self.reset_if_expired(&mut window_start, now);
        self.count.load(Ordering::SeqCst)
    }

    /// Remaining quota in the window active at `now`.
    pub fn remaining(&self, now: Instant) -> u64 {
        self.limit.saturating_sub(self.current_count(now))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time from `now` until the current window resets.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        let window_start = self.window_start.lock();
        let elapsed = now.saturating_duration_since(*window_start);
        self.window.saturating_sub(elapsed)
    }

    /// Whether the window has fully elapsed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        let window_start = self.window_start.lock();
        now.saturating_duration_since(*window_start) >= self.window
    }

    fn reset_if_expired(&self, window_start: &mut Instant, now: Instant) {
        if now.saturating_duration_since(*window_start) >= self.window {
            self.count.store(0, Ordering::SeqCst);
            *window_start = now;
        }
    }
}
