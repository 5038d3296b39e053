// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for the gateway.

use crate::limiter::RouteClass;
use crate::webhook::Stage;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Gateway metric families, registered in a private registry.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    rate_limited: IntCounterVec,
    webhooks: IntCounterVec,
    stage_failures: IntCounterVec,
    faults: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Requests handled, by route class and status"),
            &["class", "status"],
        )?;
        let rate_limited = IntCounterVec::new(
            Opts::new("gateway_rate_limited_total", "Requests rejected for exceeding quota"),
            &["class"],
        )?;
        let webhooks = IntCounterVec::new(
            Opts::new("gateway_webhooks_total", "Webhook deliveries, by source and outcome"),
            &["source", "outcome"],
        )?;
        let stage_failures = IntCounterVec::new(
            Opts::new(
                "gateway_webhook_stage_failures_total",
                "Best-effort webhook stages that failed",
            ),
            &["stage"],
        )?;
        let faults = IntCounterVec::new(
            Opts::new("gateway_faults_total", "Unexpected faults caught at the dispatcher"),
            &["kind"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(webhooks.clone()))?;
        registry.register(Box::new(stage_failures.clone()))?;
        registry.register(Box::new(faults.clone()))?;

        Ok(Self {
            registry,
            requests,
            rate_limited,
            webhooks,
            stage_failures,
            faults,
        })
    }

    pub fn record_request(&self, class: RouteClass, status: u16) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[class.scope(), status.as_str()])
            .inc();
    }

    pub fn record_rate_limited(&self, class: RouteClass) {
        self.rate_limited.with_label_values(&[class.scope()]).inc();
    }

    pub fn record_webhook(&self, source: &str, outcome: &str) {
        self.webhooks.with_label_values(&[source, outcome]).inc();
    }

    pub fn record_stage_failure(&self, stage: Stage) {
        let stage = stage.to_string();
        self.stage_failures.with_label_values(&[stage.as_str()]).inc();
    }

    pub fn record_fault(&self, kind: &str) {
        self.faults.with_label_values(&[kind]).inc();
    }

    /// Current value of a stage-failure counter.
    pub fn stage_failures(&self, stage: Stage) -> u64 {
        let stage = stage.to_string();
        self.stage_failures.with_label_values(&[stage.as_str()]).get()
    }

    /// Render all families in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
