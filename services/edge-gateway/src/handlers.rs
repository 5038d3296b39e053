// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP surface of the gateway.
//!
//! Every request passes, outermost first, through tracing, CORS (which
//! answers preflights itself), the failure boundary and the rate limiter
//! before reaching one of three branches: webhook ingestion, the origin
//! proxy, or the static informational handlers.

use crate::backends::{
    BlobStore, EventForwarder, FsBlobStore, HttpBlobStore, HttpForwarder, RedisWorkQueue, WorkQueue,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, CorsConfig};
use crate::error::{Fault, GatewayError, StartupError};
use crate::limiter::{RateLimiter, RouteClass, Verdict};
use crate::metrics::Metrics;
use crate::proxy::ReverseProxy;
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};
use crate::telemetry::{emit_best_effort, HttpTelemetrySink, LogTelemetrySink, TelemetryEvent, TelemetrySink};
use crate::webhook::WebhookPipeline;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, ConnectInfo, DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any as AnyHeaders, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "edge-gateway";
const UNKNOWN_CLIENT: &str = "unknown";
const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub limiter: RateLimiter,
    pub webhooks: WebhookPipeline,
    pub proxy: ReverseProxy,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire up production backends from configuration.
    ///
    /// Without `COUNTER_STORE_URL` counters live in process memory, which
    /// is only correct for a single instance.
    pub fn from_config(config: Config) -> Result<Self, StartupError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Arc::new(Metrics::new()?);
        let client = reqwest::Client::builder()
            .user_agent(concat!("edge-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let counters: Arc<dyn CounterStore> = match &config.stores.counter_url {
            Some(url) => Arc::new(RedisCounterStore::open(url)?),
            None => {
                warn!("No counter store configured, rate limits are per process");
                Arc::new(MemoryCounterStore::with_clock(clock.clone()))
            }
        };

        let blob_url = config.stores.blob_url.as_str();
        let blobs: Arc<dyn BlobStore> = if blob_url.starts_with("http://") || blob_url.starts_with("https://") {
            Arc::new(HttpBlobStore::new(client.clone(), blob_url)?)
        } else {
            Arc::new(FsBlobStore::new(blob_url))
        };

        let queue: Option<Arc<dyn WorkQueue>> = match &config.stores.queue_url {
            Some(url) => Some(Arc::new(RedisWorkQueue::open(url, config.stores.queue_name.clone())?)),
            None => None,
        };

        let forwarder: Option<Arc<dyn EventForwarder>> = match &config.webhooks.forward_url {
            Some(url) => Some(Arc::new(HttpForwarder::new(
                client.clone(),
                url,
                config.proxy.timeout(),
            )?)),
            None => None,
        };

        let telemetry: Arc<dyn TelemetrySink> = match &config.telemetry.endpoint {
            Some(url) => Arc::new(HttpTelemetrySink::new(
                client.clone(),
                url,
                Duration::from_millis(config.telemetry.timeout_ms),
            )?),
            None => Arc::new(LogTelemetrySink),
        };

        for source in &config.webhooks.sources {
            if source.secret.is_none() {
                warn!(source = %source.name, "Webhook source has no secret, deliveries will be rejected");
            }
        }

        let proxy = ReverseProxy::new(client, &config.proxy, &config.client_ip_header)?;
        let limiter = RateLimiter::new(config.rate_limit.clone(), counters, clock.clone());
        let webhooks = WebhookPipeline::new(
            config.webhooks.clone(),
            blobs,
            queue,
            forwarder,
            clock.clone(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            limiter,
            webhooks,
            proxy,
            telemetry,
            metrics,
            clock,
        })
    }
}

/// Client identity resolved once per request by the failure boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

/// Public description of what the gateway serves.
#[derive(Debug, Serialize)]
pub struct CapabilityResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: &'static [EndpointInfo],
}

const ENDPOINTS: &[EndpointInfo] = &[
    EndpointInfo {
        method: "GET",
        path: "/health",
        description: "Liveness and version",
    },
    EndpointInfo {
        method: "GET",
        path: "/",
        description: "This descriptor",
    },
    EndpointInfo {
        method: "POST",
        path: "/webhooks/{source}",
        description: "Signed webhook ingestion",
    },
    EndpointInfo {
        method: "ANY",
        path: "/api/v1/*",
        description: "Tenant-scoped API, proxied to the origin",
    },
];

/// Webhook acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub ok: bool,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPath {
    pub source: String,
}

/// Client IP from the first entry of `header`, else the socket peer.
pub fn client_ip(headers: &HeaderMap, header: &HeaderName, peer: Option<SocketAddr>) -> String {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: state.clock.now().to_rfc3339(),
    })
}

/// Capability descriptor, also served for unmatched paths.
pub async fn capabilities() -> Json<CapabilityResponse> {
    Json(CapabilityResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS,
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, GatewayError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| GatewayError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// `POST /webhooks/{source}/...`
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(path): Path<WebhookPath>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return state.webhooks.too_large(&path.source).into_response();
        }
        Err(rejection) => return rejection.into_response(),
    };

    match state.webhooks.ingest(&path.source, &headers, body, &ip).await {
        Ok(receipt) => Json(WebhookAck {
            ok: true,
            id: receipt.storage_key,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `/api/v1/*`, any method.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    state.proxy.forward(request, &ip).await
}

/// Fixed-window quota per route class and client IP.
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let class = RouteClass::for_path(request.uri().path());
    let identity = request
        .extensions()
        .get::<ClientIp>()
        .map(|c| c.0.clone())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match state.limiter.enforce(class, &identity).await {
        Verdict::Allowed(result) => {
            let mut response = next.run(request).await;
            result.insert_headers(response.headers_mut());
            response
        }
        Verdict::Limited(result) => {
            info!(class = %class, client_ip = %identity, "Rate limit exceeded");
            state.metrics.record_rate_limited(class);
            GatewayError::RateLimited(result).into_response()
        }
        Verdict::Bypassed(_) => next.run(request).await,
        Verdict::Unavailable(err) => GatewayError::LimiterUnavailable(err).into_response(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Outermost application middleware: resolves the client IP, contains
/// panics, and reports faults to telemetry before the generic 500 leaves.
///
/// Handling and fault reporting run in their own task, so a client
/// disconnect cannot cancel counter or storage writes already in flight,
/// nor the telemetry for a fault that has already happened.
pub async fn failure_boundary(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), state.proxy.policy().client_ip_header(), peer);
    request.extensions_mut().insert(ClientIp(ip.clone()));

    match tokio::spawn(contain(state, request, next, ip)).await {
        Ok(response) => response,
        Err(join_err) => {
            error!(error = %join_err, "Failure boundary task aborted");
            GatewayError::Internal(join_err.to_string()).into_response()
        }
    }
}

async fn contain(state: Arc<AppState>, request: Request, next: Next, ip: String) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let class = RouteClass::for_path(&path);

    let mut response = match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(join_err) => {
            let message = if join_err.is_panic() {
                let payload = join_err.into_panic();
                panic_message(&*payload)
            } else {
                "handler task cancelled".to_string()
            };
            let mut response = GatewayError::Internal(message.clone()).into_response();
            response.extensions_mut().insert(Fault {
                kind: "panic",
                message,
            });
            response
        }
    };

    if let Some(fault) = response.extensions_mut().remove::<Fault>() {
        state.metrics.record_fault(fault.kind);
        let event = TelemetryEvent {
            kind: fault.kind.to_string(),
            message: fault.message,
            client_ip: ip,
            method,
            path,
            timestamp: state.clock.now(),
        };
        emit_best_effort(state.telemetry.as_ref(), &event).await;
    }

    state.metrics.record_request(class, response.status().as_u16());
    response
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allows_any() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(AnyHeaders)
        .max_age(Duration::from_secs(86_400))
}

/// Assemble the gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.webhooks.max_body_bytes());

    let mut router = Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/webhooks/:source", post(webhook).layer(body_limit))
        .route("/webhooks/:source/*rest", post(webhook).layer(body_limit))
        .route("/api/v1", any(proxy))
        .route("/api/v1/*rest", any(proxy));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router
        .fallback(capabilities)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), failure_boundary))
        .layer(cors_layer(&state.config.cors))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
