// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the edge gateway.
//!
//! Builds a gateway router over in-memory and recording backends, driven
//! by a manual clock, plus a mock origin server on an ephemeral port.

#![allow(dead_code)]

pub mod attacks;
pub mod generators;
pub mod metrics;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use chrono::{DateTime, Utc};
use edge_gateway::{
    backends::{BackendError, BlobStore, EventForwarder, WorkQueue},
    build_router,
    clock::Clock,
    config::{Config, WebhookSource},
    limiter::RateLimiter,
    metrics::Metrics,
    proxy::ReverseProxy,
    signature,
    store::{CounterStore, MemoryCounterStore, StoreError},
    telemetry::{TelemetryError, TelemetryEvent, TelemetrySink},
    webhook::{QueueMessage, WebhookEnvelope, WebhookPipeline},
    AppState,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const START_EPOCH: i64 = 1_700_000_000;
pub const SOURCE: &str = "stripe";
pub const SECRET: &str = "whsec_test_secret";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const CLIENT_IP: &str = "203.0.113.5";

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn new(secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(secs),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0).expect("timestamp in range")
    }
}

/// How a fake backend responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

impl Behavior {
    fn apply(self, what: &str) -> Result<(), BackendError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(BackendError::Status(503)),
            Behavior::Panic => panic!("{what} exploded"),
        }
    }
}

#[derive(Debug)]
pub struct RecordingBlobStore {
    behavior: Behavior,
    pub objects: Mutex<Vec<(String, Bytes)>>,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), BackendError> {
        self.behavior.apply("blob store")?;
        self.objects.lock().unwrap().push((key.to_string(), body));
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingQueue {
    behavior: Behavior,
    pub messages: Mutex<Vec<QueueMessage>>,
}

#[async_trait]
impl WorkQueue for RecordingQueue {
    async fn send(&self, message: &QueueMessage) -> Result<(), BackendError> {
        self.behavior.apply("queue")?;
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingForwarder {
    behavior: Behavior,
    pub attempts: Mutex<Vec<WebhookEnvelope>>,
}

#[async_trait]
impl EventForwarder for RecordingForwarder {
    async fn forward(&self, envelope: &WebhookEnvelope) -> Result<(), BackendError> {
        self.attempts.lock().unwrap().push(envelope.clone());
        self.behavior.apply("forwarder")
    }
}

#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    delay: Option<Duration>,
    pub events: Mutex<Vec<TelemetryEvent>>,
}

#[async_trait]
impl TelemetrySink for RecordingTelemetry {
    async fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Counter store that is always down.
#[derive(Debug, Default)]
pub struct DownCounterStore;

#[async_trait]
impl CounterStore for DownCounterStore {
    async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _key: &str, _value: u64, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Request as seen by the mock origin.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Origin server on an ephemeral port that records what it receives.
pub struct MockOrigin {
    pub url: String,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockOrigin {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn origin_handler(
    State(seen): State<Arc<Mutex<Vec<SeenRequest>>>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let status = if parts.uri.path().ends_with("/missing") {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    seen.lock().unwrap().push(SeenRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    });

    (
        status,
        [
            ("content-type", "application/json"),
            ("server", "nginx/1.25"),
            ("x-powered-by", "Express"),
            ("x-internal-trace-id", "trace-abc123"),
            ("cache-control", "no-store"),
            ("etag", "\"v1\""),
        ],
        r#"{"widgets":[]}"#,
    )
        .into_response()
}

pub async fn spawn_origin() -> MockOrigin {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(origin_handler).with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockOrigin {
        url: format!("http://{addr}"),
        seen,
    }
}

/// URL of a port nothing listens on.
pub async fn dead_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.webhooks.sources = vec![WebhookSource {
        name: SOURCE.to_string(),
        secret: Some(SECRET.to_string()),
        signature_header: SIGNATURE_HEADER.to_string(),
    }];
    config
}

/// Gateway under test plus handles on its fakes.
pub struct TestGateway {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub blobs: Arc<RecordingBlobStore>,
    pub queue: Arc<RecordingQueue>,
    pub forwarder: Arc<RecordingForwarder>,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl TestGateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.state.metrics
    }
}

pub struct GatewayBuilder {
    config: Config,
    counters: Option<Arc<dyn CounterStore>>,
    blobs: Behavior,
    queue: Behavior,
    forwarder: Behavior,
    telemetry_delay: Option<Duration>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            config: test_config(),
            counters: None,
            blobs: Behavior::Succeed,
            queue: Behavior::Succeed,
            forwarder: Behavior::Succeed,
            telemetry_delay: None,
        }
    }
}

impl GatewayBuilder {
    pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn origin(self, url: &str) -> Self {
        let url = url.to_string();
        self.configure(|c| c.proxy.origin_url = url)
    }

    pub fn counters(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    pub fn blobs(mut self, behavior: Behavior) -> Self {
        self.blobs = behavior;
        self
    }

    pub fn queue(mut self, behavior: Behavior) -> Self {
        self.queue = behavior;
        self
    }

    pub fn forwarder(mut self, behavior: Behavior) -> Self {
        self.forwarder = behavior;
        self
    }

    /// Make the telemetry sink take `delay` before recording an event.
    pub fn slow_telemetry(mut self, delay: Duration) -> Self {
        self.telemetry_delay = Some(delay);
        self
    }

    pub fn build(self) -> TestGateway {
        let clock = Arc::new(ManualClock::new(START_EPOCH));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let metrics = Arc::new(Metrics::new().unwrap());

        let counters: Arc<dyn CounterStore> = match self.counters {
            Some(store) => store,
            None => Arc::new(MemoryCounterStore::with_clock(dyn_clock.clone())),
        };
        let blobs = Arc::new(RecordingBlobStore {
            behavior: self.blobs,
            objects: Mutex::new(Vec::new()),
        });
        let queue = Arc::new(RecordingQueue {
            behavior: self.queue,
            messages: Mutex::new(Vec::new()),
        });
        let forwarder = Arc::new(RecordingForwarder {
            behavior: self.forwarder,
            attempts: Mutex::new(Vec::new()),
        });
        let telemetry = Arc::new(RecordingTelemetry {
            delay: self.telemetry_delay,
            events: Mutex::new(Vec::new()),
        });

        let config = self.config;
        let proxy = ReverseProxy::new(reqwest::Client::new(), &config.proxy, &config.client_ip_header).unwrap();
        let limiter = RateLimiter::new(config.rate_limit.clone(), counters, dyn_clock.clone());
        let webhooks = WebhookPipeline::new(
            config.webhooks.clone(),
            blobs.clone(),
            Some(queue.clone() as Arc<dyn WorkQueue>),
            Some(forwarder.clone() as Arc<dyn EventForwarder>),
            dyn_clock.clone(),
            metrics.clone(),
        );

        let state = Arc::new(AppState {
            config,
            limiter,
            webhooks,
            proxy,
            telemetry: telemetry.clone(),
            metrics,
            clock: dyn_clock,
        });

        TestGateway {
            router: build_router(state.clone()),
            state,
            clock,
            blobs,
            queue,
            forwarder,
            telemetry,
        }
    }
}

pub fn sign(body: &[u8]) -> String {
    signature::sign(body, SECRET.as_bytes()).unwrap()
}

pub fn webhook_request(source: &str, body: &str, signature: Option<&str>, ip: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(format!("/webhooks/{source}"))
        .header("content-type", "application/json")
        .header("cf-connecting-ip", ip);
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn signed_webhook(body: &str) -> Request<Body> {
    webhook_request(SOURCE, body, Some(&sign(body.as_bytes())), CLIENT_IP)
}

pub fn get(path: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("cf-connecting-ip", ip)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
