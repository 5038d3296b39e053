// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signed webhook ingestion.
//!
//! A delivery moves through
//! `RECEIVED -> VERIFIED -> PERSISTED -> ENQUEUED -> FORWARDED -> ACK`.
//! Signature verification is the only gate: a bad signature ends the
//! delivery with 401, while failures to persist, enqueue or forward are
//! logged and counted but never change the acknowledgement sent back to
//! the sender.

use crate::backends::{BlobStore, EventForwarder, WorkQueue};
use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::signature;
use axum::body::Bytes;
use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNKNOWN: &str = "unknown";
const MAX_SEGMENT_LEN: usize = 64;

/// Immutable record of a verified delivery.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub source: String,
    pub event_type: String,
    pub raw_body: Bytes,
    pub received_at: DateTime<Utc>,
    pub storage_key: String,
}

/// Pointer record handed to the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(rename = "storageKey")]
    pub storage_key: String,
}

impl QueueMessage {
    /// Derive the queue record; non-JSON bodies travel as a string payload.
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Self {
        let payload = serde_json::from_slice(&envelope.raw_body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&envelope.raw_body).into_owned())
        });
        Self {
            source: envelope.source.clone(),
            event_type: envelope.event_type.clone(),
            payload,
            storage_key: envelope.storage_key.clone(),
        }
    }
}

/// Best-effort stages after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Persist,
    Enqueue,
    Forward,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Persist => "persist",
            Stage::Enqueue => "enqueue",
            Stage::Forward => "forward",
        })
    }
}

/// Outcome of an accepted delivery. Forwarding runs detached and is not
/// reflected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReceipt {
    pub storage_key: String,
    pub persisted: bool,
    pub enqueued: bool,
}

/// Restrict a key segment to `[A-Za-z0-9._-]`, with no leading dots and
/// no `..` anywhere.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .take(MAX_SEGMENT_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned
    }
}

/// Storage key `{source}/{eventType}/{timestamp}-{seq}.json`.
///
/// The timestamp is ISO-8601 at nanosecond precision with colons replaced
/// so the key is a valid file name everywhere. `sequence` is a per-process
/// delivery counter (low 16 bits, hex) that keeps deliveries landing on the
/// same clock reading apart.
pub fn storage_key(
    source: &str,
    event_type: &str,
    received_at: DateTime<Utc>,
    sequence: u64,
) -> String {
    let timestamp = received_at
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .replace(':', "-");
    format!(
        "{}/{}/{}-{:04x}.json",
        sanitize_segment(source),
        sanitize_segment(event_type),
        timestamp,
        sequence & 0xffff
    )
}

/// Event type from the body's top-level `type` field.
pub fn event_type_of(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Verifies, records and fans out inbound webhooks.
pub struct WebhookPipeline {
    config: WebhookConfig,
    blobs: Arc<dyn BlobStore>,
    queue: Option<Arc<dyn WorkQueue>>,
    forwarder: Option<Arc<dyn EventForwarder>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    sequence: AtomicU64,
}

impl WebhookPipeline {
    pub fn new(
        config: WebhookConfig,
        blobs: Arc<dyn BlobStore>,
        queue: Option<Arc<dyn WorkQueue>>,
        forwarder: Option<Arc<dyn EventForwarder>>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            blobs,
            queue,
            forwarder,
            clock,
            metrics,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.config.max_body_bytes
    }

    /// Reject an oversized delivery from `source_name`.
    pub fn too_large(&self, source_name: &str) -> GatewayError {
        warn!(source = %source_name, limit = self.config.max_body_bytes, "Webhook body too large");
        self.metrics.record_webhook(self.label(source_name), "too_large");
        GatewayError::PayloadTooLarge {
            limit: self.config.max_body_bytes,
        }
    }

    // Unconfigured names share one label to bound metric cardinality.
    fn label<'a>(&'a self, source_name: &str) -> &'a str {
        self.config
            .source(source_name)
            .map(|s| s.name.as_str())
            .unwrap_or("unconfigured")
    }

    /// Process one delivery from `source_name`.
    pub async fn ingest(
        &self,
        source_name: &str,
        headers: &HeaderMap,
        body: Bytes,
        client_ip: &str,
    ) -> Result<WebhookReceipt, GatewayError> {
        let source = self.config.source(source_name);
        let label = self.label(source_name);

        if body.len() > self.config.max_body_bytes {
            return Err(self.too_large(source_name));
        }

        let provided = source.and_then(|s| {
            headers
                .get(s.signature_header.as_str())
                .and_then(|v| v.to_str().ok())
        });
        let secret = source.and_then(|s| s.secret.as_deref()).map(str::as_bytes);

        if !signature::verify(&body, secret, provided) {
            warn!(
                source = %source_name,
                client_ip = %client_ip,
                known_source = source.is_some(),
                signature_present = provided.is_some(),
                "Webhook signature verification failed"
            );
            self.metrics.record_webhook(label, "rejected");
            return Err(GatewayError::Unauthorized {
                source_name: source_name.to_string(),
            });
        }

        let source_name = label;
        let received_at = self.clock.now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let event_type = event_type_of(&body);
        let envelope = WebhookEnvelope {
            source: sanitize_segment(source_name),
            storage_key: storage_key(source_name, &event_type, received_at, sequence),
            event_type: sanitize_segment(&event_type),
            raw_body: body,
            received_at,
        };
        debug!(storage_key = %envelope.storage_key, "Webhook verified");

        let persisted = match self
            .blobs
            .put(&envelope.storage_key, envelope.raw_body.clone(), "application/json")
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.stage_failed(Stage::Persist, &envelope, &e);
                false
            }
        };

        let enqueued = match &self.queue {
            Some(queue) => match queue.send(&QueueMessage::from_envelope(&envelope)).await {
                Ok(()) => true,
                Err(e) => {
                    self.stage_failed(Stage::Enqueue, &envelope, &e);
                    false
                }
            },
            None => false,
        };

        if let Some(forwarder) = self.forwarder.clone() {
            let metrics = self.metrics.clone();
            let envelope = envelope.clone();
            tokio::spawn(async move {
                if let Err(e) = forwarder.forward(&envelope).await {
                    warn!(
                        stage = %Stage::Forward,
                        storage_key = %envelope.storage_key,
                        error = %e,
                        "Webhook stage failed"
                    );
                    metrics.record_stage_failure(Stage::Forward);
                }
            });
        }

        info!(
            source = %envelope.source,
            event_type = %envelope.event_type,
            storage_key = %envelope.storage_key,
            persisted,
            enqueued,
            "Webhook accepted"
        );
        self.metrics.record_webhook(label, "accepted");

        Ok(WebhookReceipt {
            storage_key: envelope.storage_key,
            persisted,
            enqueued,
        })
    }

    fn stage_failed(&self, stage: Stage, envelope: &WebhookEnvelope, err: &dyn std::error::Error) {
        warn!(
            stage = %stage,
            storage_key = %envelope.storage_key,
            error = %err,
            "Webhook stage failed"
        );
        self.metrics.record_stage_failure(stage);
    }
}
