// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Beacon configuration system.

use std::io::Write;

use beacon_config::diagnostic::ConfigError;
use beacon_config::model::BeaconConfig;
use beacon_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_beacon_config() {
    let toml = r#"
[log]
level = "debug"

[storage]
database_path = "/tmp/beacon-test.db"
wal_mode = false
busy_timeout_ms = 250

[worker]
batch_size = 40
idle_interval_secs = 2
claim_lease_secs = 120

[retry]
max_attempts = 3
base_delay_secs = 15
max_delay_secs = 900
min_delay_secs = 5

[dispatch]
send_timeout_secs = 3
log_send_now = true

[notify]
reminder_cooldown_secs = 0

[messenger]
api_base = "http://127.0.0.1:9000"
api_version = "v20.0"
max_buttons = 2
max_button_label = 15

[sms]
api_base = "http://127.0.0.1:9001"

[email]
smtp_host = "smtp.example.com"
smtp_port = 2525
from_address = "orders@example.com"
starttls = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/beacon-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert_eq!(config.worker.batch_size, 40);
    assert_eq!(config.worker.claim_lease_secs, 120);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.min_delay_secs, 5);
    assert_eq!(config.dispatch.send_timeout_secs, 3);
    assert!(config.dispatch.log_send_now);
    assert_eq!(config.notify.reminder_cooldown_secs, 0);
    assert_eq!(config.messenger.api_version, "v20.0");
    assert_eq!(config.messenger.max_buttons, 2);
    assert_eq!(config.sms.api_base, "http://127.0.0.1:9001");
    assert_eq!(config.email.smtp_port, 2525);
    assert_eq!(config.email.from_address.as_deref(), Some("orders@example.com"));
    assert!(!config.email.starttls);
}

/// Unknown field in a section produces an error naming the bad key.
#[test]
fn unknown_field_in_worker_produces_error() {
    let toml = r#"
[worker]
batch_sise = 10
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("batch_sise"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown top-level section is rejected too.
#[test]
fn unknown_section_produces_error() {
    let err = load_config_from_str("[telegram]\nbot_token = \"x\"\n")
        .expect_err("should reject unknown section");
    assert!(format!("{err}").contains("telegram"));
}

/// Missing optional sections use defaults without error.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config, BeaconConfig::default());
    assert_eq!(config.log.level, "info");
    assert_eq!(config.worker.batch_size, 25);
    assert_eq!(config.retry.max_delay_secs, 3600);
    assert_eq!(config.notify.reminder_cooldown_secs, 3600);
    assert_eq!(config.messenger.api_base, "https://graph.facebook.com");
    assert_eq!(config.sms.api_base, "https://api.twilio.com");
    assert_eq!(config.email.smtp_port, 587);
    assert!(config.email.from_address.is_none());
}

/// A later provider overrides a single key, the way `BEACON_WORKER_BATCH_SIZE` does.
#[test]
fn dotted_override_replaces_one_key() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: BeaconConfig = Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::string("[worker]\nbatch_size = 10\nidle_interval_secs = 9\n"))
        .merge(("worker.batch_size", 30))
        .extract()
        .expect("should merge override");

    assert_eq!(config.worker.batch_size, 30);
    assert_eq!(config.worker.idle_interval_secs, 9);
}

/// Validation failures surface through the high-level entry point.
#[test]
fn load_and_validate_reports_semantic_errors() {
    let errors = load_and_validate_str("[worker]\nbatch_size = 500\n[retry]\nmax_attempts = 0\n")
        .expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, ConfigError::Validation { .. })));
}

/// Type errors name the dotted key.
#[test]
fn wrong_type_is_reported_with_key() {
    let errors = load_and_validate_str("[worker]\nbatch_size = \"many\"\n")
        .expect_err("should fail to deserialize");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidType { key, .. } if key.ends_with("batch_size")
    )));
}

/// Typos in a config file get a suggestion.
#[test]
fn file_typo_gets_suggestion_and_span() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[email]\nsmtp_hsot = \"mail.example.com\"").unwrap();
    drop(file);

    let errors = load_and_validate_path(&path).expect_err("should reject typo");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key, suggestion, ..
            } => Some((key.clone(), suggestion.clone())),
            _ => None,
        })
        .expect("unknown key diagnostic");
    assert_eq!(unknown.0, "smtp_hsot");
    assert_eq!(unknown.1.as_deref(), Some("smtp_host"));
}

/// A valid file loads through the path entry point.
#[test]
fn valid_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon.toml");
    std::fs::write(&path, "[dispatch]\nsend_timeout_secs = 2\n").unwrap();

    let config = load_and_validate_path(&path).expect("valid file");
    assert_eq!(config.dispatch.send_timeout_secs, 2);
}

/// A retry schedule without a delay floor is rejected at load time.
#[test]
fn zero_retry_floor_is_rejected_on_load() {
    let toml = r#"
[retry]
min_delay_secs = 0
base_delay_secs = 0
max_delay_secs = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("zero delays must not validate");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("min_delay_secs"))));
}
