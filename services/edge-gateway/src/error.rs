// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Gateway error taxonomy and its HTTP mapping.

use crate::backends::BackendError;
use crate::config::ConfigError;
use crate::limiter::RateLimitResult;
use crate::store::StoreError;
use crate::telemetry::TelemetryError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Body returned to clients for every gateway-generated error.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Detail of an unexpected fault, attached to 500 responses as a response
/// extension so the dispatcher can report it. Never serialized to clients.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: &'static str,
    pub message: String,
}

/// Errors surfaced by request handling.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded")]
    RateLimited(RateLimitResult),

    #[error("invalid or missing webhook signature for source {source_name}")]
    Unauthorized { source_name: String },

    #[error("payload exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("rate limiter unavailable: {0}")]
    LimiterUnavailable(#[source] StoreError),

    #[error("origin unavailable: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::LimiterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::LimiterUnavailable(_) => "LIMITER_UNAVAILABLE",
            Self::Upstream(_) => "BAD_GATEWAY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => "Unauthorized".to_string(),
            Self::LimiterUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Upstream(_) => "Bad gateway".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_secs = match &self {
            Self::RateLimited(result) => Some(result.reset_in.as_secs().max(1)),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.public_message(),
            code: self.code(),
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();

        match &self {
            Self::RateLimited(result) => {
                result.insert_headers(response.headers_mut());
                if let Some(secs) = retry_after_secs {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
            }
            Self::Internal(message) => {
                response.extensions_mut().insert(Fault {
                    kind: "internal",
                    message: message.clone(),
                });
            }
            _ => {}
        }

        response
    }
}

/// Failures while wiring the gateway together at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("counter store: {0}")]
    Store(#[from] StoreError),

    #[error("webhook backend: {0}")]
    Backend(#[from] BackendError),

    #[error("telemetry: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}
