//! Per-IP rate limiting middleware using governor.

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{net::IpAddr, net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub enabled: bool,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(1000, 60)
    }
}

impl RateLimitConfig {
    /// A client may spend the whole window's budget at once; it refills
    /// evenly across the window.
    pub fn new(requests_per_window: u32, window_secs: u64) -> Self {
        Self {
            requests_per_window,
            window_secs,
            enabled: true,
            burst_size: requests_per_window,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if !self.enabled {
            return None;
        }

        let requests = self.requests_per_window.max(1) as u128;
        let replenish_interval_ns = (self.window_secs as u128 * 1_000_000_000) / requests;
        let replenish_interval = Duration::from_nanos(replenish_interval_ns as u64);

        let Some(quota) = Quota::with_period(replenish_interval) else {
            warn!(
                window_secs = self.window_secs,
                "Rate limit window is zero, rate limiting disabled"
            );
            return None;
        };
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);

        Some(Arc::new(RateLimiter::dashmap(quota.allow_burst(burst))))
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Option<Arc<KeyedRateLimiter>>,
    pub config: RateLimitConfig,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: config.create_limiter(),
            config,
        }
    }

    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitExceeded {
    pub error: String,
    pub code: String,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs.to_string();
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();

        if let Ok(value) = HeaderValue::from_str(&retry_after) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, value.clone());
            response.headers_mut().insert("X-RateLimit-Reset", value);
        }

        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

pub async fn rate_limit_middleware(
    rate_limit_state: Option<axum::extract::Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(axum::extract::Extension(state)) = rate_limit_state else {
        return Ok(next.run(request).await);
    };

    let Some(limiter) = &state.limiter else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request);

    match limiter.check_key(&ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            add_rate_limit_headers(&mut response, &state.config);
            Ok(response)
        }
        Err(not_until) => {
            let wait_duration = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait_duration.as_secs().max(1);

            warn!(ip = %ip, retry_after_secs = retry_after, "Rate limit exceeded");

            Err(RateLimitExceeded {
                error: "Too many requests, please try again later".to_string(),
                code: "RATE_LIMITED".to_string(),
                retry_after_secs: retry_after,
            })
        }
    }
}

fn add_rate_limit_headers(response: &mut Response, config: &RateLimitConfig) {
    if let Ok(value) = HeaderValue::from_str(&config.requests_per_window.to_string()) {
        response.headers_mut().insert("X-RateLimit-Limit", value);
    }
}
