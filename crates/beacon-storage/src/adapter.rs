// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store and lookup traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use beacon_config::model::{RetryConfig, StorageConfig, WorkerConfig};
use beacon_core::{
    AdapterType, BeaconError, Channel, ChannelCredentials, CredentialSource, HealthStatus,
    InsertOutcome, Message, MessageDraft, MessageId, MessageStatus, MessageStore, PluginAdapter,
    StatusCounts, Template, TemplateSource,
};

use crate::database::Database;
use crate::queries;

/// Queue policy the store applies to every row it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Attempt budget stamped on each inserted message.
    pub max_attempts: u32,
    /// How long a claim holds a message in `sending`.
    pub claim_lease: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &WorkerConfig::default())
    }
}

impl StoreOptions {
    pub fn from_config(retry: &RetryConfig, worker: &WorkerConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            claim_lease: i64::try_from(worker.claim_lease_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::days(1)),
        }
    }
}

/// SQLite-backed message store, template source, and credential source.
///
/// The database is lazily opened on the first call to
/// [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    options: StoreOptions,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a store for `config`. Nothing is opened until [`initialize`](Self::initialize).
    pub fn new(config: StorageConfig, options: StoreOptions) -> Self {
        Self {
            config,
            options,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig, options: StoreOptions) -> Result<Self, BeaconError> {
        let store = Self::new(config, options);
        store.initialize().await?;
        Ok(store)
    }

    /// Wrap an already opened database.
    pub fn from_database(db: Database, options: StoreOptions) -> Self {
        let config = StorageConfig {
            database_path: db.path().to_string(),
            ..StorageConfig::default()
        };
        Self {
            config,
            options,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Open the database and run migrations.
    pub async fn initialize(&self) -> Result<(), BeaconError> {
        let db = Database::open_with_config(&self.config).await?;
        self.db.set(db).map_err(|_| BeaconError::StoreUnavailable {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, BeaconError> {
        self.db.get().ok_or_else(|| BeaconError::StoreUnavailable {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, BeaconError> {
        match self.database()?.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), BeaconError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, draft: MessageDraft) -> Result<InsertOutcome, BeaconError> {
        queries::messages::insert(self.database()?, draft, self.options.max_attempts).await
    }

    async fn insert_attempted(
        &self,
        draft: MessageDraft,
        error: Option<&str>,
    ) -> Result<MessageId, BeaconError> {
        queries::messages::insert_attempted(self.database()?, draft, self.options.max_attempts, error)
            .await
    }

    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Message>, BeaconError> {
        queries::messages::claim_due(self.database()?, limit, now, self.options.claim_lease).await
    }

    async fn renew_claim(
        &self,
        id: MessageId,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, BeaconError> {
        queries::messages::renew_claim(
            self.database()?,
            id,
            held_until,
            now,
            self.options.claim_lease,
        )
        .await
    }

    async fn mark_sent(&self, id: MessageId) -> Result<(), BeaconError> {
        queries::messages::mark_sent(self.database()?, id).await
    }

    async fn mark_failed(
        &self,
        id: MessageId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<MessageStatus, BeaconError> {
        queries::messages::mark_failed(self.database()?, id, error, next_attempt_at).await
    }

    async fn mark_failed_permanent(&self, id: MessageId, error: &str) -> Result<(), BeaconError> {
        queries::messages::mark_failed_permanent(self.database()?, id, error).await
    }

    async fn recover_expired(&self, now: DateTime<Utc>) -> Result<u64, BeaconError> {
        queries::messages::recover_expired(self.database()?, now).await
    }

    async fn cancel(&self, id: MessageId, reason: &str) -> Result<(), BeaconError> {
        queries::messages::cancel(self.database()?, id, reason).await
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, BeaconError> {
        queries::messages::get(self.database()?, id).await
    }

    async fn list_by_status(
        &self,
        status: MessageStatus,
        limit: usize,
    ) -> Result<Vec<Message>, BeaconError> {
        queries::messages::list_by_status(self.database()?, status, limit).await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, BeaconError> {
        queries::messages::count_by_status(self.database()?).await
    }

    async fn find_recent(
        &self,
        owner_id: i64,
        recipient: &str,
        source_event: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MessageId>, BeaconError> {
        queries::messages::find_recent(self.database()?, owner_id, recipient, source_event, since)
            .await
    }
}

#[async_trait]
impl TemplateSource for SqliteStore {
    async fn active_template(
        &self,
        owner_id: i64,
        event_key: &str,
        channel: Channel,
    ) -> Result<Option<Template>, BeaconError> {
        queries::templates::active_template(self.database()?, owner_id, event_key, channel).await
    }

    async fn template_by_id(
        &self,
        owner_id: i64,
        template_id: i64,
    ) -> Result<Option<Template>, BeaconError> {
        queries::templates::template_by_id(self.database()?, owner_id, template_id).await
    }
}

#[async_trait]
impl CredentialSource for SqliteStore {
    async fn credentials(
        &self,
        owner_id: i64,
        channel: Channel,
    ) -> Result<Option<ChannelCredentials>, BeaconError> {
        queries::credentials::credentials(self.database()?, owner_id, channel).await
    }
}
