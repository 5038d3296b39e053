// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter over a shared counter store.
//!
//! Each (scope, client, window) tuple owns one counter that expires with
//! its window, so no sweeping task is needed. Reads and writes are not
//! atomic: two requests racing in the same window may both be admitted
//! at the boundary. The limit is approximate under contention.

use crate::clock::{seconds_until_reset, window_start, Clock};
use crate::config::{FailurePolicy, RateLimitConfig, RouteLimit};
use crate::store::{CounterStore, StoreError};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Route classes with independent quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Proxied `/api/v1/*` traffic
    Api,
    /// Inbound `/webhooks/*` deliveries
    Webhook,
    /// Health, metrics and the capability descriptor
    Info,
}

impl RouteClass {
    /// Classify a request path.
    pub fn for_path(path: &str) -> Self {
        if path == "/api/v1" || path.starts_with("/api/v1/") {
            Self::Api
        } else if path.starts_with("/webhooks/") {
            Self::Webhook
        } else {
            Self::Info
        }
    }

    /// Counter-key scope for this class.
    pub fn scope(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Configured quota for the window
    pub limit: u64,
    /// Requests left in the current window after this one
    pub remaining: u64,
    /// Epoch seconds at which the window closes
    pub reset_at: i64,
    /// Time until the window closes
    pub reset_in: Duration,
}

impl RateLimitResult {
    /// Write the quota observability headers.
    pub fn insert_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at));
    }
}

/// What the dispatcher should do with a request after consulting the limiter.
#[derive(Debug)]
pub enum Verdict {
    /// Within quota
    Allowed(RateLimitResult),
    /// Quota exhausted for this window
    Limited(RateLimitResult),
    /// Store unreachable, class fails open
    Bypassed(StoreError),
    /// Store unreachable, class fails closed
    Unavailable(StoreError),
}

/// Fixed-window limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Quota settings for a route class.
    pub fn route_limit(&self, class: RouteClass) -> &RouteLimit {
        match class {
            RouteClass::Api => &self.config.api,
            RouteClass::Webhook => &self.config.webhook,
            RouteClass::Info => &self.config.info,
        }
    }

    /// Counter key for a client in the window starting at `window`.
    pub fn counter_key(scope: &str, identity: &str, window: i64) -> String {
        format!("{scope}:{identity}:{window}")
    }

    /// Count one request against `identity` in the current window.
    ///
    /// A request that finds the counter already at `limit` is rejected
    /// without incrementing, so sustained abuse cannot grow the counter.
    pub async fn check_and_increment(
        &self,
        scope: &str,
        identity: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.epoch_secs();
        let window = window_start(now, window_secs);
        let reset_secs = seconds_until_reset(now, window_secs);
        let key = Self::counter_key(scope, identity, window);

        let count = self.store.get(&key).await?.unwrap_or(0);

        let mut result = RateLimitResult {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: window + window_secs.max(1) as i64,
            reset_in: Duration::from_secs(reset_secs),
        };

        if count >= limit {
            debug!(%key, count, limit, "Rate limit exceeded");
            return Ok(result);
        }

        let count = count + 1;
        self.store.put(&key, count, window_secs.max(1)).await?;

        result.allowed = true;
        result.remaining = limit - count;
        Ok(result)
    }

    /// Check a request of `class` from `identity`, applying the class's
    /// store-failure policy.
    pub async fn enforce(&self, class: RouteClass, identity: &str) -> Verdict {
        let route = self.route_limit(class);
        match self
            .check_and_increment(class.scope(), identity, route.limit, route.window_secs)
            .await
        {
            Ok(result) if result.allowed => Verdict::Allowed(result),
            Ok(result) => Verdict::Limited(result),
            Err(err) => match route.on_store_error {
                FailurePolicy::Open => {
                    warn!(class = %class, error = %err, "Counter store unavailable, failing open");
                    Verdict::Bypassed(err)
                }
                FailurePolicy::Closed => {
                    warn!(class = %class, error = %err, "Counter store unavailable, failing closed");
                    Verdict::Unavailable(err)
                }
            },
        }
    }
}
