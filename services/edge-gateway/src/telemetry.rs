// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fault telemetry.
//!
//! Faults caught at the dispatcher boundary are reported as structured
//! events. Reporting is best-effort: a sink failure is logged and never
//! replaces the original fault.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telemetry collector responded with status {0}")]
    Status(u16),

    #[error("invalid telemetry URL {0}")]
    InvalidUrl(String),
}

/// Structured record of an unexpected fault.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Sink that only writes the fault to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        error!(
            kind = %event.kind,
            message = %event.message,
            client_ip = %event.client_ip,
            method = %event.method,
            path = %event.path,
            timestamp = %event.timestamp.to_rfc3339(),
            "Unhandled fault"
        );
        Ok(())
    }
}

/// Sink that logs the fault and posts it as JSON to a collector.
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpTelemetrySink {
    pub fn new(client: reqwest::Client, endpoint: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let endpoint = Url::parse(endpoint).map_err(|_| TelemetryError::InvalidUrl(endpoint.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        LogTelemetrySink.emit(event).await?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(event)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Status(response.status().as_u16()))
        }
    }
}

/// Emit `event`, swallowing sink failures.
pub async fn emit_best_effort(sink: &dyn TelemetrySink, event: &TelemetryEvent) {
    if let Err(e) = sink.emit(event).await {
        warn!(error = %e, kind = %event.kind, "Failed to emit telemetry");
    }
}
