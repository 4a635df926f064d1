// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles a temp SQLite store (which doubles as template and
//! credential source) and one scripted channel per [`Channel`]. Dispatcher and
//! worker tests wire these into the pieces they exercise.

use std::sync::Arc;

use beacon_config::model::{BeaconConfig, RetryConfig, StorageConfig, WorkerConfig};
use beacon_core::{BeaconError, Channel, ChannelCredentials, ContentButton, Template};
use beacon_storage::queries::{credentials, templates};
use beacon_storage::{SqliteStore, StoreOptions};

use crate::scripted_channel::ScriptedChannel;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    retry: RetryConfig,
    worker: WorkerConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            worker: WorkerConfig::default(),
        }
    }

    /// Attempt budget stamped on inserted messages.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.worker.batch_size = batch_size;
        self
    }

    pub fn with_claim_lease_secs(mut self, secs: u64) -> Self {
        self.worker.claim_lease_secs = secs;
        self
    }

    /// Build the harness, creating the temp database and running migrations.
    pub async fn build(self) -> Result<TestHarness, BeaconError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| BeaconError::StoreUnavailable {
            source: e.into(),
        })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let options = StoreOptions::from_config(&self.retry, &self.worker);
        let store = Arc::new(SqliteStore::open(storage.clone(), options).await?);

        let config = BeaconConfig {
            storage,
            retry: self.retry,
            worker: self.worker,
            ..BeaconConfig::default()
        };

        Ok(TestHarness {
            store,
            chat: Arc::new(ScriptedChannel::new(Channel::Chat)),
            sms: Arc::new(ScriptedChannel::new(Channel::Sms)),
            email: Arc::new(ScriptedChannel::new(Channel::Email)),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with scripted channels and temp storage.
pub struct TestHarness {
    /// Message store, template source and credential source in one.
    pub store: Arc<SqliteStore>,
    pub chat: Arc<ScriptedChannel>,
    pub sms: Arc<ScriptedChannel>,
    pub email: Arc<ScriptedChannel>,
    /// Configuration matching the store's options.
    pub config: BeaconConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default configuration.
    pub async fn new() -> Result<Self, BeaconError> {
        Self::builder().build().await
    }

    /// The scripted channel serving `channel`.
    pub fn channel(&self, channel: Channel) -> Arc<ScriptedChannel> {
        match channel {
            Channel::Chat => self.chat.clone(),
            Channel::Sms => self.sms.clone(),
            Channel::Email => self.email.clone(),
        }
    }

    /// Insert an active template and return its id.
    pub async fn seed_template(
        &self,
        owner_id: i64,
        event_key: &str,
        channel: Channel,
        body_text: &str,
    ) -> Result<i64, BeaconError> {
        self.seed_template_with(Template {
            id: 0,
            owner_id,
            event_key: event_key.to_string(),
            channel,
            subject: None,
            body_text: body_text.to_string(),
            body_html: None,
            buttons: Vec::<ContentButton>::new(),
            active: true,
            activated_at: Some(chrono::Utc::now()),
        })
        .await
    }

    /// Insert a fully specified template and return its id.
    pub async fn seed_template_with(&self, template: Template) -> Result<i64, BeaconError> {
        templates::insert_template(self.store.database()?, &template).await
    }

    pub async fn seed_credentials(
        &self,
        owner_id: i64,
        channel: Channel,
        creds: ChannelCredentials,
    ) -> Result<(), BeaconError> {
        credentials::set_credentials(self.store.database()?, owner_id, channel, &creds).await
    }

    /// Give `owner_id` placeholder credentials on every channel.
    pub async fn seed_all_credentials(&self, owner_id: i64) -> Result<(), BeaconError> {
        for channel in Channel::ALL {
            let creds = ChannelCredentials::new().with("token", format!("test-{channel}-token"));
            self.seed_credentials(owner_id, channel, creds).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::{ChannelAdapter, CredentialSource, MessageStore, TemplateSource};

    use super::*;

    #[tokio::test]
    async fn harness_builds_with_empty_queue() {
        let harness = TestHarness::new().await.unwrap();
        let counts = harness.store.count_by_status().await.unwrap();
        assert!(counts.values().all(|n| *n == 0));
        assert_eq!(harness.channel(Channel::Sms).channel(), Channel::Sms);
    }

    #[tokio::test]
    async fn seeded_rows_are_visible_through_the_sources() {
        let harness = TestHarness::builder()
            .with_max_attempts(3)
            .build()
            .await
            .unwrap();
        let id = harness
            .seed_template(1, "order_missing_data", Channel::Chat, "Finish here: {checkout_url}")
            .await
            .unwrap();
        harness.seed_all_credentials(1).await.unwrap();

        let template = harness
            .store
            .active_template(1, "order_missing_data", Channel::Chat)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(template.id, id);
        let creds = harness
            .store
            .credentials(1, Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.get("token"), Some("test-email-token"));
        assert_eq!(harness.store.options().max_attempts, 3);
        assert_eq!(harness.config.retry.max_attempts, 3);
    }
}
