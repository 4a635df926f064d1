// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted channel adapter for deterministic testing.
//!
//! `ScriptedChannel` implements `ChannelAdapter` with per-recipient scripted
//! outcomes and captures every send for assertion in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use beacon_core::{
    AdapterType, BeaconError, Channel, ChannelAdapter, ChannelCredentials, DeliveryResult,
    HealthStatus, PluginAdapter, RenderedContent,
};

/// One captured call to [`ChannelAdapter::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentRecord {
    pub recipient: String,
    pub content: RenderedContent,
    pub credentials: ChannelCredentials,
}

/// A channel whose outcomes are decided by the test.
///
/// Outcomes scripted for a recipient are consumed in order. Once a
/// recipient's script runs out (or none was given) the default outcome is
/// returned, which starts out as [`DeliveryResult::delivered`].
pub struct ScriptedChannel {
    channel: Channel,
    scripts: Arc<Mutex<HashMap<String, VecDeque<DeliveryResult>>>>,
    default_outcome: Arc<Mutex<DeliveryResult>>,
    sent: Arc<Mutex<Vec<SentRecord>>>,
    delay: Option<Duration>,
}

impl ScriptedChannel {
    /// Create a channel that delivers everything.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            default_outcome: Arc::new(Mutex::new(DeliveryResult::delivered())),
            sent: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep this long inside every `send`, to exercise send timeouts and
    /// batches that outlive a claim lease.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue outcomes for `recipient`, consumed one per send.
    pub async fn script(&self, recipient: &str, outcomes: impl IntoIterator<Item = DeliveryResult>) {
        self.scripts
            .lock()
            .await
            .entry(recipient.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Outcome for sends with no scripted entry left.
    pub async fn set_default(&self, outcome: DeliveryResult) {
        *self.default_outcome.lock().await = outcome;
    }

    /// Every captured send, oldest first.
    pub async fn sent_messages(&self) -> Vec<SentRecord> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of sends addressed to `recipient`.
    pub async fn sends_to(&self, recipient: &str) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|r| r.recipient == recipient)
            .count()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, BeaconError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BeaconError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> DeliveryResult {
        self.sent.lock().await.push(SentRecord {
            recipient: recipient.to_string(),
            content: content.clone(),
            credentials: credentials.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(recipient)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(outcome) => outcome,
            None => self.default_outcome.lock().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::FailureClass;

    #[tokio::test]
    async fn unscripted_recipients_are_delivered() {
        let channel = ScriptedChannel::new(Channel::Sms);
        let result = channel
            .send("+15550001111", &RenderedContent::text("hi"), &ChannelCredentials::new())
            .await;
        assert!(result.is_success());
        assert_eq!(channel.sent_count().await, 1);
        assert_eq!(channel.channel(), Channel::Sms);
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let channel = ScriptedChannel::new(Channel::Chat);
        channel
            .script(
                "PSID1",
                [
                    DeliveryResult::retriable("rate limited"),
                    DeliveryResult::permanent("blocked"),
                ],
            )
            .await;
        let content = RenderedContent::text("x");
        let creds = ChannelCredentials::new();

        let first = channel.send("PSID1", &content, &creds).await;
        let second = channel.send("PSID1", &content, &creds).await;
        let third = channel.send("PSID1", &content, &creds).await;
        assert_eq!(first.failure_class(), Some(FailureClass::Retriable));
        assert_eq!(second.failure_class(), Some(FailureClass::Permanent));
        assert!(third.is_success());
        assert_eq!(channel.sends_to("PSID1").await, 3);
    }

    #[tokio::test]
    async fn default_outcome_applies_to_everyone() {
        let channel = ScriptedChannel::new(Channel::Email);
        channel
            .set_default(DeliveryResult::retriable("smtp down"))
            .await;
        let result = channel
            .send("a@example.com", &RenderedContent::text("x"), &ChannelCredentials::new())
            .await;
        assert!(!result.is_success());

        channel.clear_sent().await;
        assert_eq!(channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn captures_content_and_credentials() {
        let channel = ScriptedChannel::new(Channel::Chat);
        let creds = ChannelCredentials::new().with("page_access_token", "tok");
        channel
            .send("PSID9", &RenderedContent::text("hello"), &creds)
            .await;
        let sent = channel.sent_messages().await;
        assert_eq!(sent[0].content.body_text, "hello");
        assert_eq!(sent[0].credentials.get("page_access_token"), Some("tok"));
    }
}
