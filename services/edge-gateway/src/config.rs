// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the edge gateway.
//!
//! Every field has a default so the gateway boots with no configuration
//! at all; deployments override values through environment variables
//! (see [`Config::from_env`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration errors detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid origin URL {url}: {reason}")]
    InvalidOrigin { url: String, reason: String },

    #[error("invalid {name} URL {url}: {reason}")]
    InvalidUrl {
        name: &'static str,
        url: String,
        reason: String,
    },

    #[error("invalid bind address {0}")]
    InvalidBindAddr(String),

    #[error("invalid metrics path {0}: must start with '/' and not shadow a gateway route")]
    InvalidMetricsPath(String),
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Header carrying the original client IP (default: cf-connecting-ip)
    #[serde(default = "default_client_ip_header")]
    pub client_ip_header: String,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub webhooks: WebhookConfig,

    #[serde(default)]
    pub stores: StoreConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Let the request through unmetered
    Open,
    /// Reject the request with 503
    Closed,
}

impl FailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Quota for one route class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteLimit {
    /// Requests allowed per window
    pub limit: u64,

    /// Window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Behaviour when the counter store is unreachable
    pub on_store_error: FailurePolicy,
}

/// Per-route-class rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Proxied API traffic (default: 100/min, fail closed)
    #[serde(default = "default_api_limit")]
    pub api: RouteLimit,

    /// Webhook ingestion (default: 300/min, fail closed)
    #[serde(default = "default_webhook_limit")]
    pub webhook: RouteLimit,

    /// Informational endpoints (default: 600/min, fail open)
    #[serde(default = "default_info_limit")]
    pub info: RouteLimit,
}

/// Reverse proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Origin base URL that `/api/v1/*` is forwarded to
    #[serde(default = "default_origin_url")]
    pub origin_url: String,

    /// Tenant used when the request carries no tenant header
    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// Header carrying the tenant identifier
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Origin request timeout in milliseconds (default: 30000)
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,

    /// Freshness window applied to successful GET responses (default: 60)
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,

    /// Request headers copied to the origin
    #[serde(default = "default_forward_headers")]
    pub forward_headers: Vec<String>,

    /// Response header name prefixes that never reach the client
    #[serde(default = "default_internal_prefixes")]
    pub internal_header_prefixes: Vec<String>,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A third-party webhook sender.
#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookSource {
    /// Path segment identifying the sender, e.g. `stripe`
    pub name: String,

    /// Shared HMAC secret
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,

    /// Header carrying the base64 HMAC-SHA256 signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
}

impl fmt::Debug for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSource")
            .field("name", &self.name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("signature_header", &self.signature_header)
            .finish()
    }
}

/// Webhook ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub sources: Vec<WebhookSource>,

    /// Internal processing endpoint events are forwarded to
    #[serde(default)]
    pub forward_url: Option<String>,

    /// Largest accepted webhook body (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl WebhookConfig {
    /// Look up a configured source by name (case-insensitive).
    pub fn source(&self, name: &str) -> Option<&WebhookSource> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// External stores holding cross-request state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL for rate-limit counters; in-memory when unset
    #[serde(default)]
    pub counter_url: Option<String>,

    /// Blob store: `http(s)://` base URL or a filesystem directory
    #[serde(default = "default_blob_url")]
    pub blob_url: String,

    /// Redis URL for the work queue; enqueue is skipped when unset
    #[serde(default)]
    pub queue_url: Option<String>,

    /// Queue (Redis list) name
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

/// Fault telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Collector endpoint; faults are only logged when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_telemetry_timeout_ms")]
    pub timeout_ms: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_client_ip_header() -> String {
    "cf-connecting-ip".to_string()
}

fn default_window_secs() -> u64 {
    60
}

fn default_api_limit() -> RouteLimit {
    RouteLimit {
        limit: 100,
        window_secs: default_window_secs(),
        on_store_error: FailurePolicy::Closed,
    }
}

fn default_webhook_limit() -> RouteLimit {
    RouteLimit {
        limit: 300,
        window_secs: default_window_secs(),
        on_store_error: FailurePolicy::Closed,
    }
}

fn default_info_limit() -> RouteLimit {
    RouteLimit {
        limit: 600,
        window_secs: default_window_secs(),
        on_store_error: FailurePolicy::Open,
    }
}

fn default_origin_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_tenant_header() -> String {
    "x-tenant-id".to_string()
}

fn default_proxy_timeout_ms() -> u64 {
    30_000
}

fn default_cache_max_age_secs() -> u64 {
    60
}

fn default_forward_headers() -> Vec<String> {
    [
        "accept",
        "accept-encoding",
        "accept-language",
        "authorization",
        "content-type",
        "cookie",
        "if-match",
        "if-none-match",
        "if-modified-since",
        "user-agent",
        "x-request-id",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_internal_prefixes() -> Vec<String> {
    vec!["x-internal-".to_string()]
}

fn default_signature_header() -> String {
    "x-signature".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_blob_url() -> String {
    "./data/webhooks".to_string()
}

fn default_queue_name() -> String {
    "webhook-events".to_string()
}

fn default_telemetry_timeout_ms() -> u64 {
    2_000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            client_ip_header: default_client_ip_header(),
            rate_limit: RateLimitConfig::default(),
            proxy: ProxyConfig::default(),
            webhooks: WebhookConfig::default(),
            stores: StoreConfig::default(),
            telemetry: TelemetryConfig::default(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: default_api_limit(),
            webhook: default_webhook_limit(),
            info: default_info_limit(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin_url: default_origin_url(),
            default_tenant: default_tenant(),
            tenant_header: default_tenant_header(),
            timeout_ms: default_proxy_timeout_ms(),
            cache_max_age_secs: default_cache_max_age_secs(),
            forward_headers: default_forward_headers(),
            internal_header_prefixes: default_internal_prefixes(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            forward_url: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            counter_url: None,
            blob_url: default_blob_url(),
            queue_url: None,
            queue_name: default_queue_name(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_telemetry_timeout_ms(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());

        let mut config = Config::default();

        if let Some(v) = var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = var("CLIENT_IP_HEADER") {
            config.client_ip_header = v.to_ascii_lowercase();
        }

        if let Some(v) = var("ORIGIN_URL") {
            config.proxy.origin_url = v;
        }
        if let Some(v) = var("DEFAULT_TENANT") {
            config.proxy.default_tenant = v;
        }
        if let Some(v) = var("TENANT_HEADER") {
            config.proxy.tenant_header = v.to_ascii_lowercase();
        }
        if let Some(v) = num("PROXY_TIMEOUT_MS") {
            config.proxy.timeout_ms = v;
        }
        if let Some(v) = num("CACHE_MAX_AGE_SECS") {
            config.proxy.cache_max_age_secs = v;
        }

        let limits = [
            ("API", &mut config.rate_limit.api),
            ("WEBHOOK", &mut config.rate_limit.webhook),
            ("INFO", &mut config.rate_limit.info),
        ];
        let window = num("RATE_LIMIT_WINDOW_SECS");
        for (class, route) in limits {
            if let Some(v) = num(&format!("RATE_LIMIT_{class}")) {
                route.limit = v;
            }
            if let Some(v) = window {
                route.window_secs = v.max(1);
            }
            if let Some(p) = var(&format!("RATE_LIMIT_{class}_ON_STORE_ERROR"))
                .and_then(|v| FailurePolicy::parse(&v))
            {
                route.on_store_error = p;
            }
        }

        config.stores.counter_url = var("COUNTER_STORE_URL");
        if let Some(v) = var("BLOB_STORE_URL") {
            config.stores.blob_url = v;
        }
        config.stores.queue_url = var("QUEUE_URL");
        if let Some(v) = var("QUEUE_NAME") {
            config.stores.queue_name = v;
        }

        config.webhooks.forward_url = var("FORWARD_URL");
        if let Some(v) = num("WEBHOOK_MAX_BODY_BYTES") {
            config.webhooks.max_body_bytes = v as usize;
        }
        if let Some(names) = var("WEBHOOK_SOURCES") {
            config.webhooks.sources = names
                .split(',')
                .map(|n| n.trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .map(|name| {
                    let suffix = name.to_ascii_uppercase().replace('-', "_");
                    WebhookSource {
                        secret: var(&format!("WEBHOOK_SECRET_{suffix}")),
                        signature_header: var(&format!("WEBHOOK_SIGNATURE_HEADER_{suffix}"))
                            .map(|h| h.to_ascii_lowercase())
                            .unwrap_or_else(default_signature_header),
                        name,
                    }
                })
                .collect();
        }

        config.telemetry.endpoint = var("TELEMETRY_URL");

        if let Some(v) = var("ALLOWED_ORIGINS") {
            config.cors.allowed_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(v) = var("METRICS_ENABLED") {
            config.metrics.enabled = !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no");
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that URLs and addresses parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))?;

        let origin = Url::parse(&self.proxy.origin_url).map_err(|e| ConfigError::InvalidOrigin {
            url: self.proxy.origin_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidOrigin {
                url: self.proxy.origin_url.clone(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        let path = self.metrics.path.as_str();
        let reserved = path == "/"
            || path == "/health"
            || path == "/healthz"
            || path.starts_with("/api/v1")
            || path.starts_with("/webhooks");
        if !path.starts_with('/') || reserved {
            return Err(ConfigError::InvalidMetricsPath(self.metrics.path.clone()));
        }

        let optional = [
            ("forward", self.webhooks.forward_url.as_ref()),
            ("telemetry", self.telemetry.endpoint.as_ref()),
        ];
        for (name, url) in optional {
            if let Some(url) = url {
                Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                    name,
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}
