// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Wall-clock source and fixed-window bucketing.
//!
//! Rate-limit counters are keyed by the start of a clock-aligned window,
//! so every gateway instance derives the same bucket for the same second
//! without coordinating.

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Source of wall-clock time.
///
/// Production uses [`SystemClock`]; tests inject a controllable clock so
/// window boundaries can be crossed deterministically.
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as whole seconds since the Unix epoch.
    fn epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Start of the fixed window containing `epoch_secs`.
///
/// A zero window length is treated as one second.
pub fn window_start(epoch_secs: i64, window_secs: u64) -> i64 {
    let window = window_secs.max(1) as i64;
    epoch_secs.div_euclid(window) * window
}

/// Seconds left until the window containing `epoch_secs` closes (at least 1).
pub fn seconds_until_reset(epoch_secs: i64, window_secs: u64) -> u64 {
    let end = window_start(epoch_secs, window_secs) + window_secs.max(1) as i64;
    (end - epoch_secs).max(1) as u64
}
