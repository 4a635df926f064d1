// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMS channel adapter backed by the Twilio Messages API.
//!
//! Each owner brings their own account: the credential set must carry
//! `account_sid`, `auth_token` and `from_number`. Only the plain-text body is
//! sent; buttons and HTML have no SMS rendition.

use std::time::Duration;

use async_trait::async_trait;
use beacon_config::model::SmsConfig;
use beacon_core::{
    AdapterType, BeaconError, Channel, ChannelAdapter, ChannelCredentials, DeliveryResult,
    FailureClass, HealthStatus, PluginAdapter, RenderedContent,
};
use serde::Deserialize;
use tracing::debug;

pub const ACCOUNT_SID: &str = "account_sid";
pub const AUTH_TOKEN: &str = "auth_token";
pub const FROM_NUMBER: &str = "from_number";

/// Twilio rejects bodies longer than this many characters.
const MAX_BODY_CHARS: usize = 1600;

/// Twilio error codes that will fail the same way on every retry.
const PERMANENT_CODES: [i64; 7] = [
    20003, // authentication failed
    21211, // invalid 'To' number
    21408, // region not enabled
    21606, // 'From' number not SMS capable
    21610, // recipient unsubscribed
    21612, // unreachable 'To' carrier
    21614, // 'To' is not a mobile number
];

/// Twilio error codes for throttling and queue overflow.
const RETRIABLE_CODES: [i64; 2] = [20429, 30001];

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

pub struct SmsAdapter {
    client: reqwest::Client,
    api_base: String,
}

impl SmsAdapter {
    pub fn new(config: &SmsConfig) -> Result<Self, BeaconError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BeaconError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
            self.api_base
        )
    }
}

#[async_trait]
impl PluginAdapter for SmsAdapter {
    fn name(&self) -> &str {
        "twilio"
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
impl ChannelAdapter for SmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> DeliveryResult {
        let (Some(sid), Some(token), Some(from)) = (
            credentials.get(ACCOUNT_SID),
            credentials.get(AUTH_TOKEN),
            credentials.get(FROM_NUMBER),
        ) else {
            return DeliveryResult::permanent(format!(
                "sms credentials need {ACCOUNT_SID}, {AUTH_TOKEN} and {FROM_NUMBER}"
            ));
        };
        if content.body_text.trim().is_empty() {
            return DeliveryResult::permanent("sms messages need a text body");
        }
        let body: String = content.body_text.chars().take(MAX_BODY_CHARS).collect();

        let response = match self
            .client
            .post(self.messages_url(sid))
            .basic_auth(sid, Some(token))
            .form(&[("To", recipient), ("From", from), ("Body", body.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DeliveryResult::retriable(format!("twilio unreachable: {e}")),
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(status = %status, "twilio response received");

        if status.is_success() {
            let mut result = DeliveryResult::delivered().with_status(status.as_u16());
            if let Ok(MessageResource { sid: Some(id), status: state }) =
                serde_json::from_str::<MessageResource>(&text)
            {
                debug!(sid = id.as_str(), state = ?state, "message accepted");
                result = result.with_provider_message_id(id);
            }
            return result;
        }

        let error = serde_json::from_str::<TwilioError>(&text).ok();
        let class = classify(status.as_u16(), error.as_ref().and_then(|e| e.code));
        let message = match &error {
            Some(e) => format!(
                "twilio error {}: {}",
                e.code.unwrap_or_default(),
                e.message
            ),
            None => format!("twilio returned {status}"),
        };
        DeliveryResult::failed(class, message)
            .with_status(status.as_u16())
            .with_response(text)
    }
}

/// Classify a failed Messages API call from its HTTP status and Twilio code.
pub fn classify(status: u16, code: Option<i64>) -> FailureClass {
    if let Some(code) = code {
        if RETRIABLE_CODES.contains(&code) {
            return FailureClass::Retriable;
        }
        if PERMANENT_CODES.contains(&code) {
            return FailureClass::Permanent;
        }
    }
    match status {
        429 | 408 => FailureClass::Retriable,
        s if s >= 500 => FailureClass::Retriable,
        _ => FailureClass::Permanent,
    }
}
