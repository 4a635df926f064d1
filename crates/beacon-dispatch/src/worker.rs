// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery worker: claim due messages, attempt each, record outcomes.
//!
//! [`Worker::run_once`] is one pass (cron style); [`Worker::run`] repeats
//! passes until cancelled, sleeping for the idle interval whenever a pass
//! finds nothing to do. Both share the same claim and record logic.

use std::sync::Arc;
use std::time::Duration;

use beacon_config::model::WorkerConfig;
use beacon_core::{BeaconError, DeliveryResult, FailureClass, Message, MessageStatus, MessageStore};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::metrics;
use crate::retry::RetryPolicy;

/// Worker settings taken from `[worker]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Most messages claimed per pass.
    pub batch_size: usize,
    /// Sleep between passes that found nothing.
    pub idle_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl WorkerOptions {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            idle_interval: Duration::from_secs(config.idle_interval_secs),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Expired claims returned to the queue (or dead-lettered).
    pub recovered: u64,
    pub claimed: usize,
    pub sent: usize,
    /// Retriable failures put back in the queue.
    pub requeued: usize,
    /// Messages that became dead this pass.
    pub dead: usize,
    /// Claimed messages skipped because their lease ran out before their
    /// turn came.
    pub lapsed: usize,
    /// Outcomes that could not be recorded.
    pub errors: usize,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        self.claimed == 0
    }
}

/// Drives claimed messages through the dispatcher.
pub struct Worker {
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(dispatcher: Arc<Dispatcher>, policy: RetryPolicy, options: WorkerOptions) -> Self {
        Self {
            dispatcher,
            policy,
            options,
        }
    }

    fn store(&self) -> &Arc<dyn MessageStore> {
        self.dispatcher.store()
    }

    /// Run one pass.
    ///
    /// Store errors while recovering or claiming abort the pass. Once a batch
    /// is claimed every message in it is attempted; a failure to record one
    /// outcome is logged and counted without stopping the rest.
    ///
    /// Messages are sent one after another, so each claim is renewed right
    /// before its provider call. A message whose lease lapsed while earlier
    /// ones were sending may already belong to another worker and is left
    /// alone.
    pub async fn run_once(&self) -> Result<PassReport, BeaconError> {
        let mut report = PassReport::default();
        let now = Utc::now();

        report.recovered = self.store().recover_expired(now).await?;
        if report.recovered > 0 {
            warn!(count = report.recovered, "recovered messages with expired claims");
        }

        let batch = self.store().claim_due(self.options.batch_size, now).await?;
        report.claimed = batch.len();
        if batch.is_empty() {
            return Ok(report);
        }
        metrics::record_claimed(batch.len());
        debug!(count = batch.len(), "claimed batch");

        for message in &batch {
            if !self.renew(message).await {
                report.lapsed += 1;
                continue;
            }
            let result = self.dispatcher.attempt_send(message).await;
            match self.record(message, &result).await {
                Ok(MessageStatus::Sent) => report.sent += 1,
                Ok(MessageStatus::Queued) => report.requeued += 1,
                Ok(MessageStatus::Dead) => report.dead += 1,
                Ok(_) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(message_id = %message.id, error = %e, "failed to record delivery outcome");
                }
            }
        }

        info!(
            claimed = report.claimed,
            sent = report.sent,
            requeued = report.requeued,
            dead = report.dead,
            lapsed = report.lapsed,
            errors = report.errors,
            "worker pass complete"
        );
        Ok(report)
    }

    /// Run passes until `cancel` fires. The pass in progress always finishes.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            batch_size = self.options.batch_size,
            idle_interval_secs = self.options.idle_interval.as_secs(),
            "worker running"
        );

        while !cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(report) => report.is_idle(),
                Err(e) => {
                    error!(error = %e, "worker pass failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.idle_interval) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        info!("worker stopped");
    }

    /// Whether this worker still holds the claim on `message`.
    async fn renew(&self, message: &Message) -> bool {
        let Some(held_until) = message.locked_until else {
            return false;
        };
        match self.store().renew_claim(message.id, held_until, Utc::now()).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(message_id = %message.id, "claim lease lapsed before send, skipping");
                false
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "failed to renew claim, skipping");
                false
            }
        }
    }

    /// Apply the outcome of one attempt through the store.
    async fn record(
        &self,
        message: &Message,
        result: &DeliveryResult,
    ) -> Result<MessageStatus, BeaconError> {
        match result.failure_class() {
            None => {
                self.store().mark_sent(message.id).await?;
                Ok(MessageStatus::Sent)
            }
            Some(FailureClass::Retriable) => {
                let attempts = message.attempts + 1;
                let next = self.policy.next_attempt_at(Utc::now(), attempts);
                let status = self
                    .store()
                    .mark_failed(message.id, &result.error_summary(), next)
                    .await?;
                if status == MessageStatus::Dead {
                    warn!(
                        message_id = %message.id,
                        attempts,
                        "retry budget exhausted, message is dead"
                    );
                }
                Ok(status)
            }
            Some(FailureClass::Permanent) => {
                self.store()
                    .mark_failed_permanent(message.id, &result.error_summary())
                    .await?;
                Ok(MessageStatus::Dead)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use beacon_core::{
        AdapterType, Channel, ChannelCredentials, ContentSpec, CredentialSource, EnqueueRequest,
        HealthStatus, InsertOutcome, MessageDraft, MessageId, PluginAdapter, StatusCounts,
    };
    use beacon_config::model::RetryConfig;
    use beacon_test_utils::{ScriptedChannel, StaticCredentials, StaticTemplates, TestHarness};
    use chrono::DateTime;

    use super::*;
    use crate::dispatcher::DispatchOptions;
    use crate::registry::AdapterRegistry;

    fn worker_for(harness: &TestHarness) -> Worker {
        let registry = AdapterRegistry::new()
            .with(harness.chat.clone())
            .with(harness.sms.clone())
            .with(harness.email.clone());
        let dispatcher = Dispatcher::new(
            harness.store.clone(),
            harness.store.clone(),
            harness.store.clone(),
            registry,
            DispatchOptions::default(),
        );
        Worker::new(
            Arc::new(dispatcher),
            RetryPolicy::from_config(&harness.config.retry),
            WorkerOptions::from_config(&harness.config.worker),
        )
    }

    fn chat_request(recipient: &str) -> EnqueueRequest {
        EnqueueRequest::new(1, Channel::Chat, recipient, ContentSpec::rendered(None, "hello"))
    }

    #[tokio::test]
    async fn mixed_batch_ends_sent_queued_and_dead() {
        let harness = TestHarness::new().await.unwrap();
        harness.seed_all_credentials(1).await.unwrap();
        harness
            .chat
            .script("PSID-retry", [DeliveryResult::retriable("rate limited").with_status(429)])
            .await;
        harness
            .chat
            .script("PSID-gone", [DeliveryResult::permanent("user unavailable").with_status(400)])
            .await;
        let worker = worker_for(&harness);
        let dispatcher = &worker.dispatcher;

        let ok = dispatcher.enqueue(chat_request("PSID-ok")).await.unwrap().id;
        let retry = dispatcher.enqueue(chat_request("PSID-retry")).await.unwrap().id;
        let gone = dispatcher.enqueue(chat_request("PSID-gone")).await.unwrap().id;

        let before = Utc::now();
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!((report.sent, report.requeued, report.dead), (1, 1, 1));

        let ok = harness.store.get(ok).await.unwrap().unwrap();
        assert_eq!(ok.status, MessageStatus::Sent);

        let retry = harness.store.get(retry).await.unwrap().unwrap();
        assert_eq!(retry.status, MessageStatus::Queued);
        assert_eq!(retry.attempts, 1);
        assert!(retry.next_attempt_at.unwrap() > before);
        assert!(retry.last_error.unwrap().contains("rate limited"));

        let gone = harness.store.get(gone).await.unwrap().unwrap();
        assert_eq!(gone.status, MessageStatus::Dead);
        assert_eq!(gone.attempts, 1);
        assert!(gone.last_error.unwrap().contains("user unavailable"));
    }

    #[tokio::test]
    async fn always_retriable_message_dies_after_exactly_max_attempts() {
        // Smallest valid backoff: every retry is due one second later.
        let harness = TestHarness::builder()
            .with_retry(RetryConfig {
                max_attempts: 3,
                base_delay_secs: 1,
                max_delay_secs: 1,
                min_delay_secs: 1,
            })
            .build()
            .await
            .unwrap();
        harness.seed_all_credentials(1).await.unwrap();
        harness
            .chat
            .set_default(DeliveryResult::retriable("provider unavailable").with_status(503))
            .await;
        let worker = worker_for(&harness);
        let id = worker
            .dispatcher
            .enqueue(chat_request("PSID1"))
            .await
            .unwrap()
            .id;

        let mut passes = 0;
        while harness.store.get(id).await.unwrap().unwrap().status != MessageStatus::Dead {
            let report = worker.run_once().await.unwrap();
            if report.requeued == 1 {
                // Not due again before the floor has passed.
                assert!(worker.run_once().await.unwrap().is_idle());
                tokio::time::sleep(Duration::from_millis(1100)).await;
            }
            passes += 1;
            assert!(passes <= 10, "message never dead-lettered");
        }

        let message = harness.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.attempts, 3);
        assert_eq!(harness.chat.sends_to("PSID1").await, 3);
        assert!(worker.run_once().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn missing_credentials_dead_letter_after_one_attempt() {
        let harness = TestHarness::new().await.unwrap();
        let worker = worker_for(&harness);
        let id = worker
            .dispatcher
            .enqueue(chat_request("PSID1"))
            .await
            .unwrap()
            .id;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.dead, 1);
        let message = harness.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.attempts, 1);
        assert!(message.last_error.unwrap().contains("no chat credentials"));
        assert_eq!(harness.chat.sent_count().await, 0);
    }

    #[tokio::test]
    async fn message_whose_lease_lapsed_mid_batch_is_skipped() {
        let harness = TestHarness::builder()
            .with_batch_size(2)
            .with_claim_lease_secs(1)
            .build()
            .await
            .unwrap();
        harness.seed_all_credentials(1).await.unwrap();
        let slow = Arc::new(ScriptedChannel::new(Channel::Chat).with_delay(Duration::from_millis(1200)));
        let dispatcher = Dispatcher::new(
            harness.store.clone(),
            harness.store.clone(),
            harness.store.clone(),
            AdapterRegistry::new().with(slow.clone()),
            DispatchOptions::default(),
        );
        let worker = Worker::new(
            Arc::new(dispatcher),
            RetryPolicy::from_config(&harness.config.retry),
            WorkerOptions::from_config(&harness.config.worker),
        );
        let first = worker.dispatcher.enqueue(chat_request("PSID1")).await.unwrap().id;
        let second = worker.dispatcher.enqueue(chat_request("PSID2")).await.unwrap().id;

        let report = worker.run_once().await.unwrap();
        assert_eq!((report.sent, report.lapsed, report.errors), (1, 1, 0));
        assert_eq!(slow.sends_to("PSID1").await, 1);
        assert_eq!(slow.sends_to("PSID2").await, 0);
        assert_eq!(
            harness.store.get(first).await.unwrap().unwrap().status,
            MessageStatus::Sent
        );

        // The skipped claim is recovered and delivered by the next pass.
        let next = worker.run_once().await.unwrap();
        assert_eq!((next.recovered, next.sent), (1, 1));
        let second = harness.store.get(second).await.unwrap().unwrap();
        assert_eq!(second.status, MessageStatus::Sent);
        assert_eq!(slow.sends_to("PSID2").await, 1);
    }

    #[tokio::test]
    async fn empty_queue_is_an_idle_pass() {
        let harness = TestHarness::new().await.unwrap();
        let report = worker_for(&harness).run_once().await.unwrap();
        assert!(report.is_idle());
        assert_eq!(report, PassReport::default());
    }

    #[tokio::test]
    async fn batch_size_bounds_each_pass() {
        let harness = TestHarness::builder()
            .with_batch_size(2)
            .build()
            .await
            .unwrap();
        harness.seed_all_credentials(1).await.unwrap();
        let worker = worker_for(&harness);
        for i in 0..5 {
            worker
                .dispatcher
                .enqueue(chat_request(&format!("PSID{i}")))
                .await
                .unwrap();
        }

        assert_eq!(worker.run_once().await.unwrap().sent, 2);
        assert_eq!(worker.run_once().await.unwrap().sent, 2);
        assert_eq!(worker.run_once().await.unwrap().sent, 1);
        assert!(worker.run_once().await.unwrap().is_idle());
        assert_eq!(harness.chat.sent_count().await, 5);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let harness = TestHarness::new().await.unwrap();
        harness.seed_all_credentials(1).await.unwrap();
        let worker = Arc::new(worker_for(&harness));
        worker
            .dispatcher
            .enqueue(chat_request("PSID1"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        for _ in 0..50 {
            if harness.chat.sent_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert_eq!(harness.chat.sent_count().await, 1);
    }

    /// A store whose every operation fails, to check that passes abort cleanly.
    struct UnavailableStore;

    fn unavailable() -> BeaconError {
        BeaconError::StoreUnavailable {
            source: "database is locked".into(),
        }
    }

    #[async_trait]
    impl PluginAdapter for UnavailableStore {
        fn name(&self) -> &str {
            "unavailable"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Storage
        }
        async fn health_check(&self) -> Result<HealthStatus, BeaconError> {
            Ok(HealthStatus::Unhealthy("down".into()))
        }
        async fn shutdown(&self) -> Result<(), BeaconError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MessageStore for UnavailableStore {
        async fn insert(&self, _: MessageDraft) -> Result<InsertOutcome, BeaconError> {
            Err(unavailable())
        }
        async fn insert_attempted(
            &self,
            _: MessageDraft,
            _: Option<&str>,
        ) -> Result<MessageId, BeaconError> {
            Err(unavailable())
        }
        async fn claim_due(&self, _: usize, _: DateTime<Utc>) -> Result<Vec<Message>, BeaconError> {
            Err(unavailable())
        }
        async fn renew_claim(
            &self,
            _: MessageId,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>, BeaconError> {
            Err(unavailable())
        }
        async fn mark_sent(&self, _: MessageId) -> Result<(), BeaconError> {
            Err(unavailable())
        }
        async fn mark_failed(
            &self,
            _: MessageId,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<MessageStatus, BeaconError> {
            Err(unavailable())
        }
        async fn mark_failed_permanent(&self, _: MessageId, _: &str) -> Result<(), BeaconError> {
            Err(unavailable())
        }
        async fn recover_expired(&self, _: DateTime<Utc>) -> Result<u64, BeaconError> {
            Err(unavailable())
        }
        async fn cancel(&self, _: MessageId, _: &str) -> Result<(), BeaconError> {
            Err(unavailable())
        }
        async fn get(&self, _: MessageId) -> Result<Option<Message>, BeaconError> {
            Err(unavailable())
        }
        async fn list_by_status(
            &self,
            _: MessageStatus,
            _: usize,
        ) -> Result<Vec<Message>, BeaconError> {
            Err(unavailable())
        }
        async fn count_by_status(&self) -> Result<StatusCounts, BeaconError> {
            Err(unavailable())
        }
        async fn find_recent(
            &self,
            _: i64,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<Option<MessageId>, BeaconError> {
            Err(unavailable())
        }
    }

    /// Credential lookup that always fails with the error built by its fn.
    struct FailingCredentials(fn() -> BeaconError);

    #[async_trait]
    impl CredentialSource for FailingCredentials {
        async fn credentials(
            &self,
            _: i64,
            _: Channel,
        ) -> Result<Option<ChannelCredentials>, BeaconError> {
            Err((self.0)())
        }
    }

    fn worker_with_credentials(harness: &TestHarness, credentials: FailingCredentials) -> Worker {
        let dispatcher = Dispatcher::new(
            harness.store.clone(),
            harness.store.clone(),
            Arc::new(credentials),
            AdapterRegistry::new().with(harness.chat.clone()),
            DispatchOptions::default(),
        );
        Worker::new(
            Arc::new(dispatcher),
            RetryPolicy::from_config(&harness.config.retry),
            WorkerOptions::from_config(&harness.config.worker),
        )
    }

    #[tokio::test]
    async fn malformed_stored_credentials_dead_letter_after_one_attempt() {
        let harness = TestHarness::new().await.unwrap();
        let worker = worker_with_credentials(
            &harness,
            FailingCredentials(|| {
                BeaconError::Config(
                    "credentials for owner 1 on chat are not a JSON object of strings".into(),
                )
            }),
        );
        let id = worker.dispatcher.enqueue(chat_request("PSID1")).await.unwrap().id;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.dead, 1);
        let message = harness.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Dead);
        assert_eq!(message.attempts, 1);
        assert!(message.last_error.unwrap().contains("credential lookup failed"));
        assert_eq!(harness.chat.sent_count().await, 0);
    }

    #[tokio::test]
    async fn unreachable_credential_store_is_retried() {
        let harness = TestHarness::new().await.unwrap();
        let worker = worker_with_credentials(&harness, FailingCredentials(unavailable));
        let id = worker.dispatcher.enqueue(chat_request("PSID1")).await.unwrap().id;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.requeued, 1);
        let message = harness.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Queued);
        assert_eq!(message.attempts, 1);
    }

    #[tokio::test]
    async fn unavailable_store_aborts_the_pass() {
        let dispatcher = Dispatcher::new(
            Arc::new(UnavailableStore),
            Arc::new(StaticTemplates::new()),
            Arc::new(StaticCredentials::new()),
            AdapterRegistry::new(),
            DispatchOptions::default(),
        );
        let worker = Worker::new(
            Arc::new(dispatcher),
            RetryPolicy::default(),
            WorkerOptions::default(),
        );
        let err = worker.run_once().await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}
