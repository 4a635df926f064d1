// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Beacon dispatch pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Beacon configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BeaconConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Message store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker polling settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry budget and backoff curve.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Dispatcher settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Notification engine policy.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Chat platform (Messenger Send API) adapter.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// SMS (Twilio) adapter.
    #[serde(default)]
    pub sms: SmsConfig,

    /// SMTP email adapter.
    #[serde(default)]
    pub email: EmailConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Message store configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("beacon").join("beacon.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "beacon.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Worker polling configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Maximum messages claimed per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep between passes when a poll finds nothing due.
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// How long a claimed message may stay in `sending` before it is
    /// considered abandoned and recovered.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            idle_interval_secs: default_idle_interval_secs(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    25
}

fn default_idle_interval_secs() -> u64 {
    5
}

fn default_claim_lease_secs() -> u64 {
    300
}

/// Retry budget and exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts after which a message is dead.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles per attempt.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Lower bound on any single delay.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            min_delay_secs: default_min_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_min_delay_secs() -> u64 {
    10
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Upper bound on a single provider call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Persist a row for synchronous sends as well.
    #[serde(default)]
    pub log_send_now: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            log_send_now: false,
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    5
}

/// Notification engine policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Window in which a repeated (owner, recipient, event) notification is
    /// suppressed. Zero disables suppression.
    #[serde(default = "default_reminder_cooldown_secs")]
    pub reminder_cooldown_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            reminder_cooldown_secs: default_reminder_cooldown_secs(),
        }
    }
}

fn default_reminder_cooldown_secs() -> u64 {
    3600
}

/// Messenger Send API adapter configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessengerConfig {
    /// Graph API base URL.
    #[serde(default = "default_messenger_api_base")]
    pub api_base: String,

    /// Graph API version segment, e.g. `v19.0`.
    #[serde(default = "default_messenger_api_version")]
    pub api_version: String,

    /// Quick replies beyond this count are dropped.
    #[serde(default = "default_max_buttons")]
    pub max_buttons: usize,

    /// Quick reply titles are truncated to this many characters.
    #[serde(default = "default_max_button_label")]
    pub max_button_label: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            api_base: default_messenger_api_base(),
            api_version: default_messenger_api_version(),
            max_buttons: default_max_buttons(),
            max_button_label: default_max_button_label(),
        }
    }
}

fn default_messenger_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_messenger_api_version() -> String {
    "v19.0".to_string()
}

fn default_max_buttons() -> usize {
    3
}

fn default_max_button_label() -> usize {
    20
}

/// Twilio SMS adapter configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    /// Twilio REST API base URL.
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_base: default_sms_api_base(),
        }
    }
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// SMTP email adapter configuration.
///
/// Credentials are per owner and come from the credential source; only the
/// relay itself is configured here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Fallback sender when an owner's credentials carry no `from_address`.
    #[serde(default)]
    pub from_address: Option<String>,

    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            from_address: None,
            starttls: default_starttls(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}
