// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Downstream services used by webhook ingestion: blob storage, the
//! work queue, and the internal processing endpoint.

use crate::webhook::{QueueMessage, WebhookEnvelope};
use async_trait::async_trait;
use axum::body::Bytes;
use redis::aio::ConnectionManager;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

pub const HEADER_WEBHOOK_SOURCE: &str = "x-webhook-source";
pub const HEADER_WEBHOOK_EVENT: &str = "x-webhook-event";
pub const HEADER_STORAGE_KEY: &str = "x-storage-key";

/// Failure of a downstream call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend responded with status {0}")]
    Status(u16),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid storage key {0}")]
    InvalidKey(String),

    #[error("invalid backend URL {0}")]
    InvalidUrl(String),
}

/// Write-once object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BackendError>;
}

/// Asynchronous work queue. Consumption happens elsewhere.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, message: &QueueMessage) -> Result<(), BackendError>;
}

/// Hand-off of a verified event to the internal processing endpoint.
#[async_trait]
pub trait EventForwarder: Send + Sync {
    async fn forward(&self, envelope: &WebhookEnvelope) -> Result<(), BackendError>;
}

fn ensure_success(response: reqwest::Response) -> Result<(), BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(BackendError::Status(status.as_u16()))
    }
}

/// Object store reached over HTTP (`PUT {base}/{key}`).
pub struct HttpBlobStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpBlobStore {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, BackendError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|_| BackendError::InvalidUrl(base_url.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn object_url(&self, key: &str) -> Result<Url, BackendError> {
        validate_key(key)?;
        self.base
            .join(key)
            .map_err(|_| BackendError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BackendError> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        ensure_success(response)
    }
}

/// Object store on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, BackendError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Objects are immutable: never overwrite an existing key.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = body.len(), "Stored object");
        Ok(())
    }
}

/// Storage keys are relative paths of plain segments.
fn validate_key(key: &str) -> Result<(), BackendError> {
    let path = Path::new(key);
    let plain = !key.is_empty()
        && !key.contains('\\')
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(BackendError::InvalidKey(key.to_string()))
    }
}

/// Work queue backed by a Redis list (`RPUSH`).
pub struct RedisWorkQueue {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    list: String,
}

impl RedisWorkQueue {
    pub fn open(url: &str, list: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
            list: list.into(),
        })
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn send(&self, message: &QueueMessage) -> Result<(), BackendError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?
            .clone();
        redis::cmd("RPUSH")
            .arg(&self.list)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Forwards the raw event body to an internal HTTP endpoint.
pub struct HttpForwarder {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let url = Url::parse(url).map_err(|_| BackendError::InvalidUrl(url.to_string()))?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }
}

#[async_trait]
impl EventForwarder for HttpForwarder {
    async fn forward(&self, envelope: &WebhookEnvelope) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_WEBHOOK_SOURCE, &envelope.source)
            .header(HEADER_WEBHOOK_EVENT, &envelope.event_type)
            .header(HEADER_STORAGE_KEY, &envelope.storage_key)
            .body(envelope.raw_body.clone())
            .send()
            .await?;
        ensure_success(response)
    }
}
