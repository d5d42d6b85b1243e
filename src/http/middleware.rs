//! Axum middleware applying the throttler guard to every request.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::config::ThrottleConfig;
use crate::throttle::{
    parse_forwarded_for, RequestInfo, ThrottleAllowance, ThrottleRejection, ThrottlerGuard,
    ThrottlerStorage, UNKNOWN_TRACKER,
};

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Message returned in the body of throttled responses.
pub const THROTTLED_MESSAGE: &str = "ThrottlerException: Too Many Requests";

/// Shared state of the throttle middleware.
pub struct ThrottleState<S: ThrottlerStorage> {
    guard: Arc<ThrottlerGuard<S>>,
    trust_forwarded_headers: bool,
    forwarded_header: String,
    emit_headers: bool,
}

impl<S: ThrottlerStorage> Clone for ThrottleState<S> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            trust_forwarded_headers: self.trust_forwarded_headers,
            forwarded_header: self.forwarded_header.clone(),
            emit_headers: self.emit_headers,
        }
    }
}

impl<S: ThrottlerStorage> ThrottleState<S> {
    /// Build middleware state from a guard and the throttle configuration.
    pub fn new(guard: Arc<ThrottlerGuard<S>>, config: &ThrottleConfig) -> Self {
        Self {
            guard,
            trust_forwarded_headers: config.trust_forwarded_headers,
            forwarded_header: config.forwarded_header.to_ascii_lowercase(),
            emit_headers: config.emit_headers,
        }
    }

    pub fn guard(&self) -> &Arc<ThrottlerGuard<S>> {
        &self.guard
    }

    /// Capture the address and route data the guard needs.
    pub fn request_info(&self, request: &Request) -> RequestInfo {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string());

        let forwarded_for = if self.trust_forwarded_headers {
            parse_forwarded_for(request.headers(), &self.forwarded_header)
        } else {
            Vec::new()
        };

        if remote_addr.is_none() && forwarded_for.is_empty() {
            warn!(
                path = %request.uri().path(),
                tracker = UNKNOWN_TRACKER,
                "Request has no client address"
            );
        }

        RequestInfo::new(request.method().clone(), request.uri().path(), remote_addr)
            .with_forwarded_for(forwarded_for)
    }
}

/// Throttle middleware, for use with `axum::middleware::from_fn_with_state`.
#[instrument(
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
pub async fn throttle<S: ThrottlerStorage + 'static>(
    State(state): State<ThrottleState<S>>,
    request: Request,
    next: Next,
) -> Response {
    let info = state.request_info(&request);

    match state.guard.check(&info).await {
        Ok(allowance) => {
            let mut response = next.run(request).await;
            if state.emit_headers {
                insert_rate_limit_headers(response.headers_mut(), &allowance);
            }
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, allowance: &ThrottleAllowance) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(allowance.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(allowance.remaining));
    headers.insert(
        RATE_LIMIT_RESET,
        HeaderValue::from(ceil_secs(allowance.reset_after)),
    );
}

/// Whole seconds, rounded up.
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl IntoResponse for ThrottleRejection {
    fn into_response(self) -> Response {
        let retry_after = ceil_secs(self.retry_after).max(1);
        let body = serde_json::json!({
            "statusCode": StatusCode::TOO_MANY_REQUESTS.as_u16(),
            "message": THROTTLED_MESSAGE,
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, HeaderValue::from(retry_after))],
            Json(body),
        )
            .into_response()
    }
}
