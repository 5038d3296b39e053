// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack patterns replayed against the gateway router.

/// Which surface an attack targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Proxied API routes
    Api,
    /// Webhook ingestion with forged signatures
    ForgedWebhook,
    /// Health and descriptor routes
    Info,
}

impl Target {
    pub fn path(&self) -> &'static str {
        match self {
            Target::Api => "/api/v1/widgets",
            Target::ForgedWebhook => "/webhooks/stripe",
            Target::Info => "/health",
        }
    }
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of unique client IPs to rotate through
    pub unique_ips: usize,
    /// Surface under attack
    pub target: Target,
    /// Quota per client IP for the targeted route class
    pub limit: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            target: Target::Info,
            limit: 20,
        }
    }
}

impl AttackConfig {
    /// Single IP flood against the API.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            unique_ips: 1,
            target: Target::Api,
            limit: 50,
        }
    }

    /// Many IPs, each staying under its own quota.
    pub fn distributed_under_quota() -> Self {
        Self {
            total_requests: 300,
            unique_ips: 30,
            target: Target::Info,
            limit: 10,
        }
    }

    /// Unsigned and mis-signed webhook spam from one sender.
    pub fn forged_webhook_spray() -> Self {
        Self {
            total_requests: 60,
            unique_ips: 1,
            target: Target::ForgedWebhook,
            limit: 25,
        }
    }

    /// Most requests any single IP can get through in one window.
    pub fn max_allowed_per_window(&self) -> usize {
        let per_ip = self.total_requests.div_ceil(self.unique_ips.max(1));
        per_ip.min(self.limit as usize) * self.unique_ips.max(1)
    }
}
