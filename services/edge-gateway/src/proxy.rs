// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tenant-aware reverse proxy to the origin API.
//!
//! Header handling is expressed as two pure transforms over header
//! multimaps: an allow-list on the way in and a deny-list on the way out.

use crate::config::{ConfigError, ProxyConfig};
use crate::error::GatewayError;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request},
    response::Response,
};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that identify the origin's software stack.
const SERVER_BANNERS: [&str; 2] = ["server", "x-powered-by"];

pub const HEADER_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Inbound `content-length`, if present and a single valid number.
fn declared_length(headers: &HeaderMap) -> Option<HeaderValue> {
    let mut values = headers.get_all(header::CONTENT_LENGTH).iter();
    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }
    value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(value.clone())
}

/// Tenant the request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
}

impl TenantContext {
    /// Read the tenant from `header`, falling back to `default` when the
    /// header is absent, blank, or not valid text.
    pub fn resolve(headers: &HeaderMap, header: &HeaderName, default: &str) -> Self {
        let tenant_id = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string();
        Self { tenant_id }
    }
}

/// Request allow-list and response deny-list.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    forward: Vec<HeaderName>,
    internal_prefixes: Vec<String>,
    tenant_header: HeaderName,
    client_ip_header: HeaderName,
}

fn header_name(name: &str) -> Option<HeaderName> {
    match HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes()) {
        Ok(h) => Some(h),
        Err(_) => {
            warn!(header = %name, "Ignoring invalid header name in configuration");
            None
        }
    }
}

impl HeaderPolicy {
    pub fn new(config: &ProxyConfig, client_ip_header: &str) -> Self {
        let tenant_header = header_name(&config.tenant_header)
            .unwrap_or_else(|| HeaderName::from_static("x-tenant-id"));
        let client_ip_header = header_name(client_ip_header)
            .unwrap_or_else(|| HeaderName::from_static("cf-connecting-ip"));
        let forward = config
            .forward_headers
            .iter()
            .filter_map(|h| header_name(h))
            .filter(|h| *h != tenant_header && *h != client_ip_header && *h != HEADER_FORWARDED_FOR)
            .collect();
        let internal_prefixes = config
            .internal_header_prefixes
            .iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            forward,
            internal_prefixes,
            tenant_header,
            client_ip_header,
        }
    }

    pub fn client_ip_header(&self) -> &HeaderName {
        &self.client_ip_header
    }

    /// Headers for the origin request: allow-listed inbound headers (all
    /// values, in order) plus the resolved tenant and client IP.
    pub fn outbound_headers(
        &self,
        inbound: &HeaderMap,
        tenant: &TenantContext,
        client_ip: &str,
    ) -> HeaderMap {
        let mut out = HeaderMap::new();
        for name in &self.forward {
            for value in inbound.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }
        if let Ok(v) = HeaderValue::from_str(&tenant.tenant_id) {
            out.insert(self.tenant_header.clone(), v);
        }
        if let Ok(v) = HeaderValue::from_str(client_ip) {
            out.insert(self.client_ip_header.clone(), v.clone());
            out.insert(HEADER_FORWARDED_FOR, v);
        }
        out
    }

    /// Whether an origin response header must be withheld from the client.
    pub fn is_denied(&self, name: &HeaderName) -> bool {
        let name = name.as_str();
        HOP_BY_HOP.contains(&name)
            || SERVER_BANNERS.contains(&name)
            || self.internal_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Origin response headers minus everything on the deny-list.
    pub fn strip_response_headers(&self, origin: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::with_capacity(origin.len());
        for (name, value) in origin {
            if !self.is_denied(name) {
                out.append(name.clone(), value.clone());
            }
        }
        out
    }
}

/// Forwards `/api/v1/*` requests to the origin.
pub struct ReverseProxy {
    client: reqwest::Client,
    origin: Url,
    policy: HeaderPolicy,
    default_tenant: String,
    cache_max_age_secs: u64,
    timeout: Duration,
}

impl ReverseProxy {
    pub fn new(client: reqwest::Client, config: &ProxyConfig, client_ip_header: &str) -> Result<Self, ConfigError> {
        let origin = Url::parse(&config.origin_url).map_err(|e| ConfigError::InvalidOrigin {
            url: config.origin_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            origin,
            policy: HeaderPolicy::new(config, client_ip_header),
            default_tenant: config.default_tenant.clone(),
            cache_max_age_secs: config.cache_max_age_secs,
            timeout: config.timeout(),
        })
    }

    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }

    /// Tenant for an inbound request.
    pub fn resolve_tenant(&self, headers: &HeaderMap) -> TenantContext {
        TenantContext::resolve(headers, &self.policy.tenant_header, &self.default_tenant)
    }

    /// Origin URL for an inbound path and query.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url, GatewayError> {
        let base = self.origin.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path_and_query}"))
            .map_err(|e| GatewayError::Internal(format!("cannot build origin URL: {e}")))
    }

    /// Forward `request` to the origin and relay the response.
    pub async fn forward(&self, request: Request<Body>, client_ip: &str) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let tenant = self.resolve_tenant(&parts.headers);
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = self.target_url(path_and_query)?;
        let method = parts.method.clone();

        debug!(
            method = %method,
            tenant = %tenant.tenant_id,
            path = %parts.uri.path(),
            "Proxying request to origin"
        );

        let mut headers = self.policy.outbound_headers(&parts.headers, &tenant, client_ip);
        let streams_body = !matches!(method, Method::GET | Method::HEAD);
        if streams_body {
            // Keep a declared length so the origin is not sent a chunked upload.
            if let Some(len) = declared_length(&parts.headers) {
                headers.insert(header::CONTENT_LENGTH, len);
            }
        }

        let mut outbound = self
            .client
            .request(method.clone(), url)
            .timeout(self.timeout)
            .headers(headers);

        if streams_body {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound.send().await.map_err(|e| {
            warn!(error = %e, tenant = %tenant.tenant_id, "Origin unreachable");
            GatewayError::Upstream(e.to_string())
        })?;

        let status = upstream.status();
        let mut headers = self.policy.strip_response_headers(upstream.headers());
        if method == Method::GET && status.is_success() {
            let value = format!("public, max-age={}", self.cache_max_age_secs);
            if let Ok(v) = HeaderValue::from_str(&value) {
                headers.insert(header::CACHE_CONTROL, v);
            }
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
