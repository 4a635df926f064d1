// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enqueue requests and their boundary validation.
//!
//! [`EnqueueRequest`] enumerates every field an upstream caller may set.
//! Routing fields are optional at the type level so that a request decoded
//! from an untrusted payload can be rejected with a [`BeaconError::Validation`]
//! naming exactly what is missing, instead of failing deserialization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BeaconError;
use crate::types::{Channel, ContentButton, RenderedContent, TemplateData};

/// Canonical form of a recipient address: surrounding whitespace removed.
/// `None` when nothing is left.
pub fn normalize_recipient(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Where message content comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSpec {
    /// Resolve the owner's active template for the event key and render it.
    Template {
        event_key: String,
        /// Pin a specific template instead of the active one for the key.
        #[serde(default)]
        template_id: Option<i64>,
        #[serde(default)]
        data: TemplateData,
    },
    /// Content the caller already rendered.
    Rendered(RenderedContent),
}

impl ContentSpec {
    pub fn template(event_key: impl Into<String>, data: TemplateData) -> Self {
        ContentSpec::Template {
            event_key: event_key.into(),
            template_id: None,
            data,
        }
    }

    pub fn rendered(subject: Option<String>, body_text: impl Into<String>) -> Self {
        ContentSpec::Rendered(RenderedContent {
            subject,
            body_text: body_text.into(),
            body_html: None,
            buttons: Vec::<ContentButton>::new(),
        })
    }

    /// The event key, when this is template-based content.
    pub fn event_key(&self) -> Option<&str> {
        match self {
            ContentSpec::Template { event_key, .. } => Some(event_key),
            ContentSpec::Rendered(_) => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            ContentSpec::Template { event_key, .. } if event_key.trim().is_empty() => {
                Err("template content requires a non-empty event_key".to_string())
            }
            ContentSpec::Rendered(content) if content.is_empty() => {
                Err("pre-rendered content has an empty body".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Business correlation ids carried through to the message row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub client_id: Option<i64>,
    pub order_id: Option<i64>,
    pub order_group_id: Option<i64>,
}

/// An upstream request to queue one outbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnqueueRequest {
    pub owner_id: i64,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub content: Option<ContentSpec>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub order_group_id: Option<i64>,
    /// Advisory only; higher values are claimed first when due together.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Identifies the logical event; repeated enqueues with the same key
    /// for the same owner resolve to the first message.
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
    /// Event that produced this request, for tracing.
    #[serde(default)]
    pub source_event: Option<String>,
}

impl EnqueueRequest {
    pub fn new(owner_id: i64, channel: Channel, recipient: impl Into<String>, content: ContentSpec) -> Self {
        Self {
            owner_id,
            channel: Some(channel),
            recipient: Some(recipient.into()),
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.client_id = correlation.client_id;
        self.order_id = correlation.order_id;
        self.order_group_id = correlation.order_group_id;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = Some(secs);
        self
    }

    pub fn with_source_event(mut self, event: impl Into<String>) -> Self {
        self.source_event = Some(event.into());
        self
    }

    /// Check routing and content fields, reporting every problem at once.
    pub fn validate(self) -> Result<ValidatedRequest, BeaconError> {
        let mut problems = Vec::new();

        if self.owner_id <= 0 {
            problems.push(format!("owner_id must be positive, got {}", self.owner_id));
        }
        if self.channel.is_none() {
            problems.push("missing channel".to_string());
        }
        let recipient = self
            .recipient
            .as_deref()
            .and_then(normalize_recipient)
            .map(str::to_string);
        if recipient.is_none() {
            problems.push("missing recipient address".to_string());
        }
        match &self.content {
            None => problems.push("missing content: supply a template reference or rendered content".to_string()),
            Some(content) => {
                if let Err(problem) = content.validate() {
                    problems.push(problem);
                }
            }
        }
        let delay = match self.delay_secs.filter(|s| *s > 0) {
            None => None,
            Some(secs) => {
                let delay = i64::try_from(secs).ok().and_then(Duration::try_seconds);
                if delay.is_none() {
                    problems.push(format!("delay_secs {secs} is out of range"));
                }
                delay
            }
        };
        let dedupe_key = self
            .dedupe_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        match (self.channel, recipient, self.content) {
            (Some(channel), Some(recipient), Some(content)) if problems.is_empty() => {
                Ok(ValidatedRequest {
                    owner_id: self.owner_id,
                    channel,
                    recipient,
                    source_event: self
                        .source_event
                        .or_else(|| content.event_key().map(str::to_string)),
                    content,
                    correlation: Correlation {
                        client_id: self.client_id,
                        order_id: self.order_id,
                        order_group_id: self.order_group_id,
                    },
                    priority: self.priority.unwrap_or(0),
                    dedupe_key,
                    delay,
                })
            }
            _ => Err(BeaconError::Validation(problems.join("; "))),
        }
    }
}

/// An [`EnqueueRequest`] whose routing fields are known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub owner_id: i64,
    pub channel: Channel,
    pub recipient: String,
    pub content: ContentSpec,
    pub correlation: Correlation,
    pub priority: i32,
    pub dedupe_key: Option<String>,
    pub delay: Option<Duration>,
    pub source_event: Option<String>,
}

impl ValidatedRequest {
    /// Earliest send time for a request validated at `now`.
    pub fn not_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.delay.map(|d| now + d)
    }
}
