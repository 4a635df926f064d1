// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./beacon.toml` > `~/.config/beacon/beacon.toml` > `/etc/beacon/beacon.toml`
//! with environment variable overrides via `BEACON_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BeaconConfig;

/// Config sections addressable through `BEACON_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "log",
    "storage",
    "worker",
    "retry",
    "dispatch",
    "notify",
    "messenger",
    "sms",
    "email",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/beacon/beacon.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "beacon.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("beacon/beacon.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/beacon/beacon.toml` (system-wide)
/// 3. `~/.config/beacon/beacon.toml` (user XDG config)
/// 4. `./beacon.toml` (local directory)
/// 5. `BEACON_*` environment variables
pub fn load_config() -> Result<BeaconConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<BeaconConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BeaconConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit section mapping.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `BEACON_WORKER_BATCH_SIZE` maps to `worker.batch_size`, not
/// `worker.batch.size`.
fn env_provider() -> Env {
    Env::prefixed("BEACON_").map(|key| env_key_to_path(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a config path.
pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
