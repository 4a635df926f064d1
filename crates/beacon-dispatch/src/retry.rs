// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry backoff policy.

use std::time::Duration;

use beacon_config::model::RetryConfig;
use chrono::{DateTime, Utc};

/// Exponential backoff between delivery attempts.
///
/// The delay after the n-th failed attempt is `base * 2^(n-1)`, clamped to
/// `[min_delay, max_delay]`. The sequence never decreases as `n` grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.base_delay_secs),
            min_delay: Duration::from_secs(config.min_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
            max_attempts: config.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `attempts` failed attempts (1-based; 0 is treated as 1).
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        let raw = self.base_delay.saturating_mul(factor);
        // max wins over min when misconfigured.
        raw.max(self.min_delay).min(self.max_delay)
    }

    /// When a message that has now failed `attempts` times becomes due again.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
