// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tally for attack simulation.

use axum::http::StatusCode;
use std::collections::HashMap;

/// Request outcome as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    RateLimited,
    Unauthorized,
    Unavailable,
    Other(u16),
}

impl From<StatusCode> for Outcome {
    fn from(status: StatusCode) -> Self {
        match status {
            s if s.is_success() => Outcome::Allowed,
            StatusCode::TOO_MANY_REQUESTS => Outcome::RateLimited,
            StatusCode::UNAUTHORIZED => Outcome::Unauthorized,
            StatusCode::SERVICE_UNAVAILABLE => Outcome::Unavailable,
            other => Outcome::Other(other.as_u16()),
        }
    }
}

/// Collects outcomes during an attack.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    outcomes: HashMap<Outcome, usize>,
    allowed_per_ip: HashMap<String, usize>,
}

impl AttackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: StatusCode, ip: &str) {
        let outcome = Outcome::from(status);
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        if outcome == Outcome::Allowed {
            *self.allowed_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Largest number of requests any single IP got through.
    pub fn max_allowed_for_one_ip(&self) -> usize {
        self.allowed_per_ip.values().copied().max().unwrap_or(0)
    }

    /// Ratio of non-allowed to total requests.
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        (total - self.count(Outcome::Allowed)) as f64 / total as f64
    }
}

impl std::fmt::Display for AttackMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Outcomes ===")?;
        writeln!(f, "Total:        {}", self.total_requests())?;
        writeln!(f, "Allowed:      {}", self.count(Outcome::Allowed))?;
        writeln!(f, "Rate limited: {}", self.count(Outcome::RateLimited))?;
        writeln!(f, "Unauthorized: {}", self.count(Outcome::Unauthorized))?;
        writeln!(f, "Block rate:   {:.1}%", self.block_rate() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_rate() {
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(StatusCode::OK, "10.0.0.1");
        }
        for _ in 0..7 {
            metrics.record(StatusCode::TOO_MANY_REQUESTS, "10.0.0.1");
        }
        assert!((metrics.block_rate() - 0.7).abs() < 0.01);
        assert_eq!(metrics.max_allowed_for_one_ip(), 3);
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(Outcome::from(StatusCode::UNAUTHORIZED), Outcome::Unauthorized);
        assert_eq!(Outcome::from(StatusCode::BAD_GATEWAY), Outcome::Other(502));
    }
}
