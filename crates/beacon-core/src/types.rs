// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message model and common types shared across the Beacon pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Variable bindings handed to the template renderer.
pub type TemplateData = serde_json::Map<String, serde_json::Value>;

/// Surrogate identifier of a queued message, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
}

/// A messaging transport.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Chat platform thread (page-scoped user id as address).
    Chat,
    /// SMS, addressed by E.164 phone number.
    Sms,
    /// Email, addressed by mailbox.
    Email,
}

impl Channel {
    /// Every channel the pipeline knows about.
    pub const ALL: [Channel; 3] = [Channel::Chat, Channel::Sms, Channel::Email];
}

/// Lifecycle status of a message.
///
/// Allowed transitions: `queued -> sending`, `sending -> sent`,
/// `sending -> queued` (retriable failure), `sending -> dead`,
/// `queued -> cancelled`. `sent`, `dead` and `cancelled` are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sending,
    Sent,
    Dead,
    Cancelled,
}

impl MessageStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Sent | MessageStatus::Dead | MessageStatus::Cancelled
        )
    }
}

/// An interactive element attached to a message (quick reply or link button).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentButton {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Fully rendered message content, fixed at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedContent {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub buttons: Vec<ContentButton>,
}

impl RenderedContent {
    /// Plain-text content with no subject or buttons.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body_text: body.into(),
            ..Default::default()
        }
    }

    /// True when there is nothing a recipient could read.
    pub fn is_empty(&self) -> bool {
        self.body_text.trim().is_empty()
            && self
                .body_html
                .as_deref()
                .is_none_or(|html| html.trim().is_empty())
    }
}

/// An owner-defined content pattern, keyed by (owner, event key, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub owner_id: i64,
    pub event_key: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body_text: String,
    pub body_html: Option<String>,
    #[serde(default)]
    pub buttons: Vec<ContentButton>,
    pub active: bool,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Everything the store needs to create a new message row.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub owner_id: i64,
    pub client_id: Option<i64>,
    pub order_id: Option<i64>,
    pub order_group_id: Option<i64>,
    pub channel: Channel,
    pub recipient: String,
    pub content: RenderedContent,
    pub template_id: Option<i64>,
    pub source_event: Option<String>,
    pub dedupe_key: Option<String>,
    pub priority: i32,
    /// Earliest send time; `None` means immediately eligible.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl MessageDraft {
    /// A draft with no correlation ids, default priority, and no delay.
    pub fn new(owner_id: i64, channel: Channel, recipient: impl Into<String>, content: RenderedContent) -> Self {
        Self {
            owner_id,
            client_id: None,
            order_id: None,
            order_group_id: None,
            channel,
            recipient: recipient.into(),
            content,
            template_id: None,
            source_event: None,
            dedupe_key: None,
            priority: 0,
            next_attempt_at: None,
        }
    }
}

/// Result of inserting a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub id: MessageId,
    /// True when a row with the same dedupe key already existed and nothing
    /// was inserted.
    pub duplicate: bool,
}

/// A persisted message row.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub owner_id: i64,
    pub client_id: Option<i64>,
    pub order_id: Option<i64>,
    pub order_group_id: Option<i64>,
    pub channel: Channel,
    pub recipient: String,
    pub content: RenderedContent,
    pub template_id: Option<i64>,
    pub status: MessageStatus,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub source_event: Option<String>,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of messages in each status.
pub type StatusCounts = BTreeMap<MessageStatus, u64>;

/// Provider credentials for one owner and channel.
///
/// Values are opaque strings keyed by provider-specific names
/// (`page_access_token`, `account_sid`, ...). `Debug` never prints values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelCredentials(BTreeMap<String, String>);

impl ChannelCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a non-empty value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Values under secret-looking keys, for scrubbing provider responses
    /// before they are persisted. Sender numbers and addresses stay readable.
    pub fn secret_values(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(key, value)| !value.is_empty() && is_secret_key(key))
            .map(|(_, value)| value.clone())
            .collect()
    }
}

/// Key fragments that mark a credential value as secret.
const SECRET_KEY_MARKERS: &[&str] = &["token", "password", "secret"];

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

impl fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl From<BTreeMap<String, String>> for ChannelCredentials {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }
}

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Timeouts, 5xx, rate limiting: try again later.
    Retriable,
    /// Invalid recipient, revoked permission, other 4xx: retrying cannot help.
    Permanent,
}

/// What happened to a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(FailureClass),
}

/// Ephemeral result of one channel adapter call. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub outcome: DeliveryOutcome,
    pub provider_status: Option<u16>,
    pub provider_response: Option<String>,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Longest provider response kept in an error summary.
const MAX_RESPONSE_IN_SUMMARY: usize = 500;

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self {
            outcome: DeliveryOutcome::Delivered,
            provider_status: None,
            provider_response: None,
            provider_message_id: None,
            error: None,
        }
    }

    pub fn retriable(error: impl Into<String>) -> Self {
        Self::failed(FailureClass::Retriable, error)
    }

    pub fn permanent(error: impl Into<String>) -> Self {
        Self::failed(FailureClass::Permanent, error)
    }

    pub fn failed(class: FailureClass, error: impl Into<String>) -> Self {
        Self {
            outcome: DeliveryOutcome::Failed(class),
            error: Some(error.into()),
            ..Self::delivered()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.provider_status = Some(status);
        self
    }

    pub fn with_response(mut self, body: impl Into<String>) -> Self {
        self.provider_response = Some(body.into());
        self
    }

    pub fn with_provider_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        match self.outcome {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::Failed(class) => Some(class),
        }
    }

    /// One-line description suitable for `last_error`.
    pub fn error_summary(&self) -> String {
        let mut summary = self
            .error
            .clone()
            .unwrap_or_else(|| "delivery failed".to_string());
        if let Some(status) = self.provider_status {
            summary.push_str(&format!(" (HTTP {status})"));
        }
        if let Some(body) = self.provider_response.as_deref().filter(|b| !b.is_empty()) {
            let cut = body
                .char_indices()
                .nth(MAX_RESPONSE_IN_SUMMARY)
                .map(|(i, _)| i)
                .unwrap_or(body.len());
            summary.push_str(": ");
            summary.push_str(&body[..cut]);
        }
        summary
    }
}

/// Where a synchronous send goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRef {
    pub channel: Channel,
    pub address: String,
}

impl RecipientRef {
    pub fn new(channel: Channel, address: impl Into<String>) -> Self {
        Self {
            channel,
            address: address.into(),
        }
    }
}
