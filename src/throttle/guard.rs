//! The throttler guard: tracker resolution, policy selection, enforcement.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::policy::{PolicySelector, RateLimitPolicy};
use super::storage::{ThrottleKey, ThrottleRecord, ThrottlerStorage};
use super::tracker::{resolve_tracker, ClientIdentity, RequestInfo};

/// Everything handed to the storage for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleRequest<'a> {
    pub request: &'a RequestInfo,
    pub tracker: ClientIdentity,
    pub route_class: &'a str,
    pub policy: RateLimitPolicy,
}

impl ThrottleRequest<'_> {
    pub fn key(&self) -> ThrottleKey {
        ThrottleKey::new(self.tracker.clone(), self.route_class)
    }
}

/// Quota state after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleAllowance {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

/// Raised when a tracker exceeds its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleRejection {
    pub tracker: ClientIdentity,
    pub route_class: String,
    pub limit: u64,
    /// How long the client should wait before retrying
    pub retry_after: Duration,
}

impl std::fmt::Display for ThrottleRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Too Many Requests: {} exceeded {} requests for {} (retry after {}s)",
            self.tracker,
            self.limit,
            self.route_class,
            self.retry_after.as_secs()
        )
    }
}

impl std::error::Error for ThrottleRejection {}

/// Admission guard applied to every inbound request.
///
/// Resolves exactly one tracker and one policy per request, then asks the
/// storage to count the hit.
pub struct ThrottlerGuard<S: ThrottlerStorage> {
    selector: PolicySelector,
    storage: Arc<S>,
}

impl<S: ThrottlerStorage> ThrottlerGuard<S> {
    pub fn new(selector: PolicySelector, storage: Arc<S>) -> Self {
        Self { selector, storage }
    }

    /// Resolve tracker and policy without counting.
    pub fn prepare<'a>(&'a self, request: &'a RequestInfo) -> ThrottleRequest<'a> {
        let selected = self.selector.select(&request.path);
        ThrottleRequest {
            request,
            tracker: resolve_tracker(request),
            route_class: selected.route_class,
            policy: selected.policy,
        }
    }

    /// Count the request and decide whether it may proceed.
    pub async fn check(
        &self,
        request: &RequestInfo,
    ) -> std::result::Result<ThrottleAllowance, ThrottleRejection> {
        let throttle = self.prepare(request);
        let key = throttle.key();

        debug!(
            key = %key,
            method = %request.method,
            path = %request.path,
            limit = throttle.policy.limit,
            ttl_ms = throttle.policy.ttl_ms,
            "Checking throttle"
        );

        let record = self.storage.increment(&key, &throttle.policy).await;
        Self::decide(&throttle, record)
    }

    fn decide(
        throttle: &ThrottleRequest<'_>,
        record: ThrottleRecord,
    ) -> std::result::Result<ThrottleAllowance, ThrottleRejection> {
        if record.is_over_limit() {
            warn!(
                tracker = %throttle.tracker,
                route_class = throttle.route_class,
                hits = record.total_hits,
                limit = record.limit,
                "Throttle limit exceeded"
            );
            return Err(ThrottleRejection {
                tracker: throttle.tracker.clone(),
                route_class: throttle.route_class.to_string(),
                limit: record.limit,
                retry_after: record.reset_after,
            });
        }

        Ok(ThrottleAllowance {
            limit: record.limit,
            remaining: record.remaining,
            reset_after: record.reset_after,
        })
    }

    pub fn selector(&self) -> &PolicySelector {
        &self.selector
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}
