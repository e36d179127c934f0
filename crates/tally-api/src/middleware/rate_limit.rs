//! Global request rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::{Quota, RateLimiter};
use tracing::{info, warn};

use crate::config::RateLimitConfig;
use crate::AppState;

/// Direct quota, no keyed bucketing: one owner per deployment.
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build the limiter, or `None` when disabled or misconfigured.
pub fn build_rate_limiter(config: &RateLimitConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !config.enabled {
        info!(subsystem = "api", "Rate limiting disabled");
        return None;
    }

    let Some(burst) = NonZeroU32::new(config.requests) else {
        warn!(subsystem = "api", "RATE_LIMIT_REQUESTS is zero, rate limiting disabled");
        return None;
    };
    let Some(quota) = Quota::with_period(Duration::from_secs(config.period_secs)) else {
        warn!(subsystem = "api", "RATE_LIMIT_PERIOD_SECS is zero, rate limiting disabled");
        return None;
    };

    info!(
        subsystem = "api",
        requests = config.requests,
        period_secs = config.period_secs,
        "Rate limiting enabled"
    );
    Some(Arc::new(RateLimiter::direct(quota.allow_burst(burst))))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!(subsystem = "api", "Rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            )
                .into_response();
        }
    }
    next.run(request).await
}
