// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform channel adapter for the Beacon pipeline.
//!
//! Sends through the Messenger Send API using the owner's page access token.
//! Buttons become quick replies, or a button template when any button links
//! to a URL. Button count and label length are capped by configuration.

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use beacon_config::model::MessengerConfig;
use beacon_core::{
    AdapterType, BeaconError, Channel, ChannelAdapter, ChannelCredentials, ContentButton,
    DeliveryResult, FailureClass, HealthStatus, PluginAdapter, RenderedContent,
};
use tracing::debug;

use crate::types::{
    Attachment, ButtonTemplate, GraphErrorResponse, OutgoingMessage, QuickReply, Recipient,
    SendRequest, SendResponse, TemplateButton,
};

/// Credential key holding the page access token.
pub const PAGE_ACCESS_TOKEN: &str = "page_access_token";

/// Longest text the Send API accepts in a plain message.
const MAX_TEXT_CHARS: usize = 2000;

/// Longest text allowed above a button template.
const MAX_TEMPLATE_TEXT_CHARS: usize = 640;

/// Graph error codes that mean "slow down", not "give up".
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];

/// Graph error codes for transient platform trouble.
const TRANSIENT_CODES: [i64; 2] = [1, 2];

/// Graph error codes for unavailable recipients or missing permission.
const PERMANENT_CODES: [i64; 4] = [10, 190, 200, 551];

/// Messenger Send API adapter.
#[derive(Debug, Clone)]
pub struct MessengerAdapter {
    client: reqwest::Client,
    endpoint: String,
    max_buttons: usize,
    max_button_label: usize,
}

impl MessengerAdapter {
    pub fn new(config: &MessengerConfig) -> Result<Self, BeaconError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BeaconError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/me/messages",
                config.api_base.trim_end_matches('/'),
                config.api_version
            ),
            max_buttons: config.max_buttons,
            max_button_label: config.max_button_label,
        })
    }

    /// Full Send API URL, without the token.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the Send API body for `content`.
    pub fn build_request(&self, recipient: &str, content: &RenderedContent) -> SendRequest {
        let buttons: Vec<&ContentButton> = content
            .buttons
            .iter()
            .filter(|b| !b.label.trim().is_empty())
            .take(self.max_buttons)
            .collect();

        let message = if buttons.iter().any(|b| b.url.is_some()) {
            OutgoingMessage::Attachment {
                attachment: Attachment {
                    attachment_type: "template",
                    payload: ButtonTemplate {
                        template_type: "button",
                        text: truncate(&content.body_text, MAX_TEMPLATE_TEXT_CHARS),
                        buttons: buttons
                            .iter()
                            .map(|b| self.template_button(b))
                            .collect(),
                    },
                },
            }
        } else {
            OutgoingMessage::Text {
                text: truncate(&content.body_text, MAX_TEXT_CHARS),
                quick_replies: buttons
                    .iter()
                    .map(|b| QuickReply {
                        content_type: "text",
                        title: truncate(&b.label, self.max_button_label),
                        payload: b.payload.clone().unwrap_or_else(|| b.label.clone()),
                    })
                    .collect(),
            }
        };

        SendRequest {
            recipient: Recipient {
                id: recipient.to_string(),
            },
            messaging_type: "UPDATE",
            message,
        }
    }

    fn template_button(&self, button: &ContentButton) -> TemplateButton {
        let title = truncate(&button.label, self.max_button_label);
        match &button.url {
            Some(url) => TemplateButton::WebUrl {
                url: url.clone(),
                title,
            },
            None => TemplateButton::Postback {
                title,
                payload: button.payload.clone().unwrap_or_else(|| button.label.clone()),
            },
        }
    }
}

#[async_trait]
impl PluginAdapter for MessengerAdapter {
    fn name(&self) -> &str {
        "messenger"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, BeaconError> {
        // Tokens are per owner, so there is nothing to check without one.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BeaconError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MessengerAdapter {
    fn channel(&self) -> Channel {
        Channel::Chat
    }

    async fn send(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> DeliveryResult {
        let Some(token) = credentials.get(PAGE_ACCESS_TOKEN) else {
            return DeliveryResult::permanent(format!("missing {PAGE_ACCESS_TOKEN} credential"));
        };
        if content.body_text.trim().is_empty() {
            return DeliveryResult::permanent("chat messages need a text body");
        }

        let request = self.build_request(recipient, content);
        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("access_token", token)])
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(e),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, "send api response received");

        if status.is_success() {
            let parsed = serde_json::from_str::<SendResponse>(&body).ok();
            let mut result = DeliveryResult::delivered().with_status(status.as_u16());
            if let Some(id) = parsed.and_then(|r| r.message_id) {
                result = result.with_provider_message_id(id);
            }
            return result;
        }

        let graph = serde_json::from_str::<GraphErrorResponse>(&body)
            .ok()
            .map(|r| r.error);
        let class = classify(status.as_u16(), graph.as_ref().and_then(|e| e.code));
        let message = match &graph {
            Some(error) => format!(
                "send api error (code {}): {}",
                error.code.unwrap_or_default(),
                error.message
            ),
            None => format!("send api returned {status}"),
        };
        DeliveryResult::failed(class, message)
            .with_status(status.as_u16())
            .with_response(body)
    }
}

/// Classify a failed Send API call from its HTTP status and Graph error code.
pub fn classify(status: u16, code: Option<i64>) -> FailureClass {
    if status == 429 {
        return FailureClass::Retriable;
    }
    if let Some(code) = code {
        if RATE_LIMIT_CODES.contains(&code) || TRANSIENT_CODES.contains(&code) {
            return FailureClass::Retriable;
        }
        if PERMANENT_CODES.contains(&code) {
            return FailureClass::Permanent;
        }
    }
    if status >= 500 {
        FailureClass::Retriable
    } else {
        FailureClass::Permanent
    }
}

fn transport_failure(error: reqwest::Error) -> DeliveryResult {
    // The URL carries the token.
    let error = error.without_url();
    if error.is_builder() {
        DeliveryResult::permanent(format!("invalid send api request: {error}"))
    } else {
        DeliveryResult::retriable(format!("send api unreachable: {error}"))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
