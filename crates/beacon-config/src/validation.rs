// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as bounded batch sizes, ordered backoff limits, and non-empty paths.

use std::ops::RangeInclusive;

use crate::diagnostic::ConfigError;
use crate::model::BeaconConfig;

/// Claim batch size must stay within this range.
pub const BATCH_SIZE_RANGE: RangeInclusive<usize> = 1..=50;

/// Provider call timeout must stay within this range (seconds).
pub const SEND_TIMEOUT_RANGE: RangeInclusive<u64> = 1..=30;

/// Longest claim lease accepted (one day).
pub const MAX_CLAIM_LEASE_SECS: u64 = 86_400;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BeaconConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if !BATCH_SIZE_RANGE.contains(&config.worker.batch_size) {
        fail(format!(
            "worker.batch_size must be between {} and {}, got {}",
            BATCH_SIZE_RANGE.start(),
            BATCH_SIZE_RANGE.end(),
            config.worker.batch_size
        ));
    }

    if config.worker.idle_interval_secs == 0 {
        fail("worker.idle_interval_secs must be at least 1".to_string());
    }

    if config.worker.claim_lease_secs > MAX_CLAIM_LEASE_SECS {
        fail(format!(
            "worker.claim_lease_secs must be at most {MAX_CLAIM_LEASE_SECS}, got {}",
            config.worker.claim_lease_secs
        ));
    }

    if config.worker.claim_lease_secs <= config.dispatch.send_timeout_secs {
        fail(format!(
            "worker.claim_lease_secs ({}) must exceed dispatch.send_timeout_secs ({})",
            config.worker.claim_lease_secs, config.dispatch.send_timeout_secs
        ));
    }

    if config.retry.max_attempts == 0 {
        fail("retry.max_attempts must be at least 1".to_string());
    }

    // A zero floor would make a retriable failure due again immediately.
    if config.retry.min_delay_secs == 0 {
        fail("retry.min_delay_secs must be at least 1".to_string());
    }

    if config.retry.base_delay_secs == 0 {
        fail("retry.base_delay_secs must be at least 1".to_string());
    }

    if config.retry.min_delay_secs > config.retry.max_delay_secs {
        fail(format!(
            "retry.min_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            config.retry.min_delay_secs, config.retry.max_delay_secs
        ));
    }

    if !SEND_TIMEOUT_RANGE.contains(&config.dispatch.send_timeout_secs) {
        fail(format!(
            "dispatch.send_timeout_secs must be between {} and {}, got {}",
            SEND_TIMEOUT_RANGE.start(),
            SEND_TIMEOUT_RANGE.end(),
            config.dispatch.send_timeout_secs
        ));
    }

    for (key, value) in [
        ("messenger.api_base", &config.messenger.api_base),
        ("sms.api_base", &config.sms.api_base),
    ] {
        if !(value.starts_with("https://") || value.starts_with("http://")) {
            fail(format!("{key} must be an http(s) URL, got `{value}`"));
        }
    }

    if config.messenger.max_button_label == 0 {
        fail("messenger.max_button_label must be at least 1".to_string());
    }

    if config.email.smtp_host.trim().is_empty() {
        fail("email.smtp_host must not be empty".to_string());
    }

    if let Some(from) = &config.email.from_address
        && !from.contains('@')
    {
        fail(format!("email.from_address `{from}` is not a mailbox"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &BeaconConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        let config = BeaconConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = BeaconConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn batch_size_outside_range_fails() {
        let mut config = BeaconConfig::default();
        config.worker.batch_size = 0;
        assert!(messages(&config).iter().any(|m| m.contains("worker.batch_size")));
        config.worker.batch_size = 51;
        assert!(messages(&config).iter().any(|m| m.contains("worker.batch_size")));
        config.worker.batch_size = 50;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn send_timeout_outside_range_fails() {
        let mut config = BeaconConfig::default();
        config.dispatch.send_timeout_secs = 60;
        let found = messages(&config);
        assert!(found.iter().any(|m| m.contains("dispatch.send_timeout_secs must be between")));
    }

    #[test]
    fn inverted_backoff_bounds_fail() {
        let mut config = BeaconConfig::default();
        config.retry.min_delay_secs = 7200;
        assert!(messages(&config).iter().any(|m| m.contains("retry.min_delay_secs")));
    }

    #[test]
    fn zero_retry_delays_fail() {
        let mut config = BeaconConfig::default();
        config.retry.min_delay_secs = 0;
        config.retry.base_delay_secs = 0;
        config.retry.max_delay_secs = 0;
        let found = messages(&config);
        assert!(found.iter().any(|m| m.contains("retry.min_delay_secs must be at least 1")));
        assert!(found.iter().any(|m| m.contains("retry.base_delay_secs must be at least 1")));

        config.retry.min_delay_secs = 1;
        config.retry.base_delay_secs = 1;
        config.retry.max_delay_secs = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = BeaconConfig::default();
        config.retry.max_attempts = 0;
        config.worker.batch_size = 500;
        config.sms.api_base = "api.twilio.com".to_string();
        config.email.from_address = Some("not-a-mailbox".to_string());
        assert_eq!(validate_config(&config).unwrap_err().len(), 4);
    }
}
