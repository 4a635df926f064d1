// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner-event notification policy in front of the dispatcher.
//!
//! Business code reports what happened ([`OwnerEvent`]); the engine decides
//! whether that should become a message. Repeated reminders for the same
//! recipient and event inside the cooldown window are suppressed, and events
//! the owner has no template for are skipped rather than failed.

use std::sync::Arc;

use beacon_config::model::NotifyConfig;
use beacon_core::{
    normalize_recipient, BeaconError, Channel, ContentSpec, Correlation, EnqueueRequest,
    MessageId, TemplateData,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::metrics;

/// A business event addressed to one recipient of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerEvent {
    pub owner_id: i64,
    pub event_key: String,
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub data: TemplateData,
    #[serde(default)]
    pub correlation: Correlation,
    #[serde(default)]
    pub dedupe_key: Option<String>,
}

impl OwnerEvent {
    pub fn new(
        owner_id: i64,
        event_key: impl Into<String>,
        channel: Channel,
        recipient: impl Into<String>,
        data: TemplateData,
    ) -> Self {
        Self {
            owner_id,
            event_key: event_key.into(),
            channel,
            recipient: recipient.into(),
            data,
            correlation: Correlation::default(),
            dedupe_key: None,
        }
    }

    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}

/// Why an event produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The owner has no active template for the event on this channel.
    NoTemplate,
}

/// What the engine did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Enqueued { id: MessageId, duplicate: bool },
    /// A message for the same recipient and event went out within the cooldown.
    Suppressed { existing: MessageId },
    Skipped(SkipReason),
}

/// Applies reminder policy, then delegates to [`Dispatcher::enqueue`].
pub struct NotificationEngine {
    dispatcher: Arc<Dispatcher>,
    cooldown: Option<chrono::Duration>,
}

impl NotificationEngine {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &NotifyConfig) -> Self {
        let cooldown = match config.reminder_cooldown_secs {
            0 => None,
            secs => i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds),
        };
        Self {
            dispatcher,
            cooldown,
        }
    }

    pub async fn notify(&self, event: OwnerEvent) -> Result<NotifyOutcome, BeaconError> {
        // Rows store the normalized recipient, so look up the same form.
        // A blank recipient falls through to enqueue, which rejects it.
        if let Some(cooldown) = self.cooldown
            && let Some(recipient) = normalize_recipient(&event.recipient)
            && let Some(since) = Utc::now().checked_sub_signed(cooldown)
            && let Some(existing) = self
                .dispatcher
                .store()
                .find_recent(event.owner_id, recipient, &event.event_key, since)
                .await?
        {
            metrics::record_suppressed(event.channel);
            info!(
                owner_id = event.owner_id,
                event_key = event.event_key.as_str(),
                existing = %existing,
                "notification suppressed by cooldown"
            );
            return Ok(NotifyOutcome::Suppressed { existing });
        }

        let OwnerEvent {
            owner_id,
            event_key,
            channel,
            recipient,
            data,
            correlation,
            dedupe_key,
        } = event;
        let mut request = EnqueueRequest::new(
            owner_id,
            channel,
            recipient,
            ContentSpec::template(event_key.clone(), data),
        )
        .with_correlation(correlation)
        .with_source_event(event_key.clone());
        if let Some(key) = dedupe_key {
            request = request.with_dedupe_key(key);
        }

        match self.dispatcher.enqueue(request).await {
            Ok(outcome) => Ok(NotifyOutcome::Enqueued {
                id: outcome.id,
                duplicate: outcome.duplicate,
            }),
            Err(BeaconError::NoTemplate { .. }) => {
                debug!(
                    owner_id,
                    event_key = event_key.as_str(),
                    channel = %channel,
                    "no template configured, event skipped"
                );
                Ok(NotifyOutcome::Skipped(SkipReason::NoTemplate))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::{MessageStore, MessageStatus};
    use beacon_test_utils::TestHarness;
    use serde_json::json;

    use super::*;
    use crate::dispatcher::DispatchOptions;
    use crate::registry::AdapterRegistry;

    fn engine_for(harness: &TestHarness, cooldown_secs: u64) -> NotificationEngine {
        let dispatcher = Dispatcher::new(
            harness.store.clone(),
            harness.store.clone(),
            harness.store.clone(),
            AdapterRegistry::new().with(harness.chat.clone()),
            DispatchOptions::default(),
        );
        NotificationEngine::new(
            Arc::new(dispatcher),
            &NotifyConfig {
                reminder_cooldown_secs: cooldown_secs,
            },
        )
    }

    fn reminder(recipient: &str) -> OwnerEvent {
        let data = json!({"checkout_url": "https://shop.example/c/7"});
        OwnerEvent::new(
            1,
            "order_missing_data",
            Channel::Chat,
            recipient,
            data.as_object().cloned().unwrap_or_default(),
        )
        .with_correlation(Correlation {
            order_id: Some(7),
            ..Correlation::default()
        })
    }

    async fn seeded() -> TestHarness {
        let harness = TestHarness::new().await.unwrap();
        harness
            .seed_template(1, "order_missing_data", Channel::Chat, "Finish: {checkout_url}")
            .await
            .unwrap();
        harness
    }

    #[tokio::test]
    async fn first_event_is_enqueued_with_correlation() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);

        let NotifyOutcome::Enqueued { id, duplicate } = engine.notify(reminder("PSID1")).await.unwrap()
        else {
            panic!("expected enqueue");
        };
        assert!(!duplicate);
        let stored = harness.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.order_id, Some(7));
        assert_eq!(stored.content.body_text, "Finish: https://shop.example/c/7");
    }

    #[tokio::test]
    async fn repeat_within_cooldown_is_suppressed() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);

        let NotifyOutcome::Enqueued { id, .. } = engine.notify(reminder("PSID1")).await.unwrap() else {
            panic!("expected enqueue");
        };
        assert_eq!(
            engine.notify(reminder("PSID1")).await.unwrap(),
            NotifyOutcome::Suppressed { existing: id }
        );
        // Another recipient is unaffected.
        assert!(matches!(
            engine.notify(reminder("PSID2")).await.unwrap(),
            NotifyOutcome::Enqueued { .. }
        ));
    }

    #[tokio::test]
    async fn cancelled_messages_do_not_suppress() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);

        let NotifyOutcome::Enqueued { id, .. } = engine.notify(reminder("PSID1")).await.unwrap() else {
            panic!("expected enqueue");
        };
        harness.store.cancel(id, "order paid").await.unwrap();
        assert_eq!(
            harness.store.get(id).await.unwrap().unwrap().status,
            MessageStatus::Cancelled
        );
        assert!(matches!(
            engine.notify(reminder("PSID1")).await.unwrap(),
            NotifyOutcome::Enqueued { .. }
        ));
    }

    #[tokio::test]
    async fn padded_recipient_is_suppressed_like_the_stored_one() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);

        let NotifyOutcome::Enqueued { id, .. } = engine.notify(reminder("PSID1")).await.unwrap() else {
            panic!("expected enqueue");
        };
        assert_eq!(
            engine.notify(reminder(" PSID1 ")).await.unwrap(),
            NotifyOutcome::Suppressed { existing: id }
        );
        let counts = harness.store.count_by_status().await.unwrap();
        assert_eq!(counts[&MessageStatus::Queued], 1);
    }

    #[tokio::test]
    async fn dead_reminder_does_not_block_the_next_one() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);

        let NotifyOutcome::Enqueued { id, .. } = engine.notify(reminder("PSID1")).await.unwrap() else {
            panic!("expected enqueue");
        };
        harness.store.claim_due(1, Utc::now()).await.unwrap();
        harness
            .store
            .mark_failed_permanent(id, "user unavailable")
            .await
            .unwrap();

        assert!(matches!(
            engine.notify(reminder("PSID1")).await.unwrap(),
            NotifyOutcome::Enqueued { duplicate: false, .. }
        ));
    }

    #[tokio::test]
    async fn zero_cooldown_disables_suppression() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 0);
        engine.notify(reminder("PSID1")).await.unwrap();
        assert!(matches!(
            engine.notify(reminder("PSID1")).await.unwrap(),
            NotifyOutcome::Enqueued { duplicate: false, .. }
        ));
    }

    #[tokio::test]
    async fn missing_template_is_skipped_not_failed() {
        let harness = TestHarness::new().await.unwrap();
        let engine = engine_for(&harness, 3600);
        assert_eq!(
            engine.notify(reminder("PSID1")).await.unwrap(),
            NotifyOutcome::Skipped(SkipReason::NoTemplate)
        );
        let counts = harness.store.count_by_status().await.unwrap();
        assert_eq!(counts.values().sum::<u64>(), 0);
    }

    #[tokio::test]
    async fn invalid_events_still_fail() {
        let harness = seeded().await;
        let engine = engine_for(&harness, 3600);
        let err = engine.notify(reminder("  ")).await.unwrap_err();
        assert!(matches!(err, BeaconError::Validation(_)));
    }
}
