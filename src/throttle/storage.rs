//! Counting backends for the throttler guard.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::counter::WindowCounter;
use super::policy::RateLimitPolicy;
use super::tracker::ClientIdentity;

/// Identifies one counter: a client within a route class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub tracker: ClientIdentity,
    pub route_class: String,
}

impl ThrottleKey {
    pub fn new(tracker: ClientIdentity, route_class: &str) -> Self {
        Self {
            tracker,
            route_class: route_class.to_string(),
        }
    }
}

impl std::fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.route_class, self.tracker)
    }
}

/// Outcome of a single increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRecord {
    /// Hits counted in the current window, including this one
    pub total_hits: u64,
    /// Limit of the counter
    pub limit: u64,
    /// Remaining quota in the current window
    pub remaining: u64,
    /// Time until the current window resets
    pub reset_after: Duration,
}

impl ThrottleRecord {
    pub fn is_over_limit(&self) -> bool {
        self.total_hits > self.limit
    }
}

/// Trait for counting backends.
///
/// Implementations must make increment-and-check atomic per key.
#[async_trait]
pub trait ThrottlerStorage: Send + Sync {
    /// Count one hit for `key` under `policy`.
    async fn increment(&self, key: &ThrottleKey, policy: &RateLimitPolicy) -> ThrottleRecord;
}

/// In-process fixed-window storage.
///
/// This struct is thread-safe and can be shared across multiple tasks.
#[derive(Default)]
pub struct MemoryStorage {
    counters: DashMap<ThrottleKey, WindowCounter>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit for `key` as of `now`.
    pub fn increment_at(
        &self,
        key: &ThrottleKey,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> ThrottleRecord {
        let mut counter = self.counters.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                limit = policy.limit,
                ttl_ms = policy.ttl_ms,
                "Creating new throttle counter"
            );
            WindowCounter::new(policy.limit as u64, policy.ttl(), now)
        });

        if counter.limit() != policy.limit as u64 || counter.window() != policy.ttl() {
            debug!(
                key = %key,
                limit = policy.limit,
                ttl_ms = policy.ttl_ms,
                "Policy changed, restarting throttle counter"
            );
            *counter = WindowCounter::new(policy.limit as u64, policy.ttl(), now);
        }

        let total_hits = counter.increment(1, now);
        let record = ThrottleRecord {
            total_hits,
            limit: counter.limit(),
            remaining: counter.limit().saturating_sub(total_hits),
            reset_after: counter.duration_until_reset(now),
        };

        trace!(key = %key, hits = record.total_hits, limit = record.limit, "Counted hit");
        record
    }

    /// Hits recorded for `key` in its current window, if a counter exists.
    pub fn current_count(&self, key: &ThrottleKey) -> Option<u64> {
        self.counters
            .get(key)
            .map(|c| c.current_count(Instant::now()))
    }

    /// Drop counters whose window has elapsed at `now`.
    ///
    /// Returns the number of counters removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            debug!(removed = removed, remaining = self.counters.len(), "Purged expired counters");
        }
        removed
    }

    /// Periodically purge expired counters until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let storage = Arc::clone(self);
        info!(interval_secs = every.as_secs(), "Starting counter sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                storage.purge_expired(tokio::time::Instant::now().into_std());
            }
        })
    }

    /// Get the number of active counters.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

#[async_trait]
impl ThrottlerStorage for MemoryStorage {
    async fn increment(&self, key: &ThrottleKey, policy: &RateLimitPolicy) -> ThrottleRecord {
        self.increment_at(key, policy, Instant::now())
    }
}
