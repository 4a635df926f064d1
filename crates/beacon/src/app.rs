// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by every subcommand: store, adapters, dispatcher.

use std::sync::Arc;

use beacon_config::model::BeaconConfig;
use beacon_core::{BeaconError, PluginAdapter};
use beacon_dispatch::{
    AdapterRegistry, DispatchOptions, Dispatcher, RetryPolicy, Worker, WorkerOptions,
};
use beacon_storage::{SqliteStore, StoreOptions};
use tracing::info;

/// Everything a subcommand needs, built from configuration.
pub struct App {
    pub config: BeaconConfig,
    pub store: Arc<SqliteStore>,
    pub dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Open the database (running migrations) and register the compiled-in
    /// channel adapters.
    pub async fn open(config: BeaconConfig) -> Result<Self, BeaconError> {
        let store = Arc::new(
            SqliteStore::open(
                config.storage.clone(),
                StoreOptions::from_config(&config.retry, &config.worker),
            )
            .await?,
        );
        let registry = build_registry(&config)?;
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry,
            DispatchOptions::from_config(&config.dispatch),
        ));
        Ok(Self {
            config,
            store,
            dispatcher,
        })
    }

    /// Stop the channel adapters, then checkpoint the store's WAL.
    pub async fn shutdown(&self) -> Result<(), BeaconError> {
        self.dispatcher.registry().shutdown_all().await;
        self.store.shutdown().await
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.dispatcher.clone(),
            RetryPolicy::from_config(&self.config.retry),
            WorkerOptions::from_config(&self.config.worker),
        )
    }
}

/// Registers one adapter per channel feature that was compiled in.
pub fn build_registry(config: &BeaconConfig) -> Result<AdapterRegistry, BeaconError> {
    #[allow(unused_mut)]
    let mut registry = AdapterRegistry::new();

    #[cfg(feature = "messenger")]
    registry.register(Arc::new(beacon_messenger::MessengerAdapter::new(
        &config.messenger,
    )?));

    #[cfg(feature = "sms")]
    registry.register(Arc::new(beacon_sms::SmsAdapter::new(&config.sms)?));

    #[cfg(feature = "email")]
    registry.register(Arc::new(beacon_email::EmailAdapter::new(&config.email)?));

    info!(channels = ?registry.channels(), "channel adapters registered");
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use beacon_core::Channel;

    /// Config pointing at a fresh database inside `dir`.
    pub(crate) fn config_in(dir: &tempfile::TempDir) -> BeaconConfig {
        let mut config = BeaconConfig::default();
        config.storage.database_path = dir.path().join("beacon.db").display().to_string();
        config.email.from_address = Some("shop@example.com".into());
        config
    }

    #[test]
    fn default_features_register_every_channel() {
        let registry = build_registry(&BeaconConfig::default()).unwrap();
        assert_eq!(registry.channels(), Channel::ALL.to_vec());
    }

    #[tokio::test]
    async fn open_creates_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config_in(&dir)).await.unwrap();
        assert!(dir.path().join("beacon.db").exists());
        assert!(app.worker().run_once().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn shutdown_checkpoints_the_wal() {
        use beacon_core::{ContentSpec, EnqueueRequest};

        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config_in(&dir)).await.unwrap();
        app.dispatcher
            .enqueue(EnqueueRequest::new(
                1,
                Channel::Sms,
                "+15550000001",
                ContentSpec::rendered(None, "Your order shipped"),
            ))
            .await
            .unwrap();

        app.shutdown().await.unwrap();
        let wal = dir.path().join("beacon.db-wal");
        let wal_len = std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        assert_eq!(wal_len, 0, "WAL should be truncated on shutdown");
    }
}
