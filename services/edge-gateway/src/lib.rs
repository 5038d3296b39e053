// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Storefront Edge Gateway
//!
//! A single HTTP entry point in front of a multi-tenant storefront API:
//!
//! - Fixed-window rate limiting per route class and client IP, backed by
//!   a shared counter store
//! - Signed webhook ingestion (HMAC-SHA256) with best-effort persistence,
//!   queueing and forwarding
//! - Tenant-aware reverse proxying of `/api/v1/*` to the origin, with
//!   header hygiene in both directions
//! - CORS, fault telemetry and Prometheus metrics

pub mod backends;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod proxy;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod webhook;

pub use config::Config;
pub use error::{GatewayError, StartupError};
pub use handlers::{build_router, AppState};
pub use limiter::{RateLimitResult, RateLimiter, RouteClass};
pub use webhook::WebhookPipeline;
