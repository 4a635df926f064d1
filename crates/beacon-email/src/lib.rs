// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email channel adapter sending through an SMTP relay with lettre.
//!
//! The relay host comes from `[email]` configuration. Login and sender
//! address are per owner (`smtp_username`, `smtp_password`, `from_address`),
//! falling back to the configured `from_address` when the owner has none.

use std::time::Duration;

use async_trait::async_trait;
use beacon_config::model::EmailConfig;
use beacon_core::{
    AdapterType, BeaconError, Channel, ChannelAdapter, ChannelCredentials, DeliveryResult,
    FailureClass, HealthStatus, PluginAdapter, RenderedContent,
};
use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Code;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

pub const SMTP_USERNAME: &str = "smtp_username";
pub const SMTP_PASSWORD: &str = "smtp_password";
pub const FROM_ADDRESS: &str = "from_address";

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailAdapter {
    config: EmailConfig,
}

impl EmailAdapter {
    pub fn new(config: &EmailConfig) -> Result<Self, BeaconError> {
        if config.smtp_host.trim().is_empty() {
            return Err(BeaconError::Config("email.smtp_host must not be empty".into()));
        }
        if let Some(from) = &config.from_address {
            from.parse::<Mailbox>().map_err(|e| {
                BeaconError::Config(format!("email.from_address `{from}` is invalid: {e}"))
            })?;
        }
        Ok(Self {
            config: config.clone(),
        })
    }

    /// Build the MIME message. An `Err` carries a permanent failure reason.
    pub fn build_message(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> Result<Message, String> {
        let from = credentials
            .get(FROM_ADDRESS)
            .or(self.config.from_address.as_deref())
            .ok_or_else(|| format!("no sender: set {FROM_ADDRESS} or email.from_address"))?;
        let from: Mailbox = from
            .parse()
            .map_err(|e| format!("invalid sender address `{from}`: {e}"))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| format!("invalid recipient address `{recipient}`: {e}"))?;

        let mut builder = Message::builder().from(from).to(to);
        if let Some(subject) = content.subject.as_deref() {
            builder = builder.subject(subject);
        }

        let html = content.body_html.as_deref().filter(|h| !h.trim().is_empty());
        let built = match html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                content.body_text.clone(),
                html.to_string(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(content.body_text.clone()),
        };
        built.map_err(|e| format!("failed to build email: {e}"))
    }

    fn transport(
        &self,
        credentials: &ChannelCredentials,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, lettre::transport::smtp::Error> {
        let host = self.config.smtp_host.as_str();
        let mut builder = if self.config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        builder = builder
            .port(self.config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(pass)) = (
            credentials.get(SMTP_USERNAME),
            credentials.get(SMTP_PASSWORD),
        ) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl PluginAdapter for EmailAdapter {
    fn name(&self) -> &str {
        "smtp"
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
impl ChannelAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> DeliveryResult {
        if content.is_empty() {
            return DeliveryResult::permanent("email needs a text or html body");
        }
        let message = match self.build_message(recipient, content, credentials) {
            Ok(message) => message,
            Err(reason) => return DeliveryResult::permanent(reason),
        };
        let transport = match self.transport(credentials) {
            Ok(transport) => transport,
            Err(e) => return DeliveryResult::permanent(format!("invalid smtp relay: {e}")),
        };

        match transport.send(message).await {
            Ok(response) => {
                let code = response.code();
                debug!(code = %code, "smtp relay accepted message");
                let mut result = DeliveryResult::delivered();
                if let Some(code) = reply_code(code) {
                    result = result.with_status(code);
                }
                if let Some(line) = response.message().next() {
                    result = result.with_provider_message_id(line.to_string());
                }
                result
            }
            Err(e) => {
                let mut result = DeliveryResult::failed(classify(&e), format!("smtp error: {e}"));
                if let Some(code) = e.status().and_then(reply_code) {
                    result = result.with_status(code);
                }
                result
            }
        }
    }
}

fn reply_code(code: Code) -> Option<u16> {
    code.to_string().parse().ok()
}

/// 5xx replies and client-side errors are permanent; 4xx replies and
/// connection trouble are retriable.
pub fn classify(error: &lettre::transport::smtp::Error) -> FailureClass {
    if error.is_permanent() || error.is_client() {
        FailureClass::Permanent
    } else {
        FailureClass::Retriable
    }
}
