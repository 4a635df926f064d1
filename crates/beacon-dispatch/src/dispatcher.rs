// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: enqueue, synchronous send, and single delivery attempts.
//!
//! Content is resolved and rendered once, at enqueue time. The worker path
//! ([`Dispatcher::attempt_send`]) only ever sends what is stored on the row.

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_config::model::DispatchConfig;
use beacon_core::{
    BeaconError, Channel, ChannelCredentials, ContentSpec, CredentialSource, DeliveryResult,
    EnqueueRequest, InsertOutcome, Message, MessageDraft, MessageId, MessageStore, RecipientRef,
    RenderedContent, TemplateData, TemplateSource, ValidatedRequest,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::redact::redact;
use crate::registry::AdapterRegistry;

/// Tracing target for the one-per-attempt delivery log entry.
pub const DELIVERY_TARGET: &str = "beacon_dispatch::delivery";

/// Dispatcher settings taken from `[dispatch]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on one provider call.
    pub send_timeout: Duration,
    /// Whether [`Dispatcher::send_now`] writes a log row by default.
    pub log_send_now: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl DispatchOptions {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            log_send_now: config.log_send_now,
        }
    }
}

/// Content after template resolution, ready to store or send.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedContent {
    content: RenderedContent,
    template_id: Option<i64>,
}

/// Identifies one delivery for logging.
struct AttemptContext<'a> {
    message_id: Option<MessageId>,
    owner_id: i64,
    channel: Channel,
    recipient: &'a str,
    attempt: u32,
}

/// Accepts enqueue requests and drives single delivery attempts.
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    templates: Arc<dyn TemplateSource>,
    credentials: Arc<dyn CredentialSource>,
    registry: AdapterRegistry,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        templates: Arc<dyn TemplateSource>,
        credentials: Arc<dyn CredentialSource>,
        registry: AdapterRegistry,
        options: DispatchOptions,
    ) -> Self {
        info!(
            channels = ?registry.channels(),
            send_timeout_ms = options.send_timeout.as_millis() as u64,
            "dispatcher initialized"
        );
        Self {
            store,
            templates,
            credentials,
            registry,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Validate, render, and queue one message.
    ///
    /// Template content with no matching active template fails with
    /// [`BeaconError::NoTemplate`] and inserts nothing. A repeated dedupe key
    /// returns the original message with `duplicate = true`.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<InsertOutcome, BeaconError> {
        let request = request.validate()?;
        let resolved = self
            .resolve_content(request.owner_id, request.channel, &request.content)
            .await?;

        let draft = draft_from(&request, resolved);
        let channel = draft.channel;
        let outcome = self.store.insert(draft).await?;

        if outcome.duplicate {
            debug!(
                message_id = %outcome.id,
                owner_id = request.owner_id,
                dedupe_key = request.dedupe_key.as_deref().unwrap_or_default(),
                "duplicate enqueue resolved to existing message"
            );
        } else {
            metrics::record_enqueued(channel);
            info!(
                message_id = %outcome.id,
                owner_id = request.owner_id,
                channel = %channel,
                source_event = request.source_event.as_deref().unwrap_or_default(),
                delayed = request.delay.is_some(),
                "message enqueued"
            );
        }
        Ok(outcome)
    }

    /// Send immediately, bypassing the queue. Logs a row when configured to.
    pub async fn send_now(
        &self,
        owner_id: i64,
        recipient: &RecipientRef,
        content: ContentSpec,
    ) -> Result<DeliveryResult, BeaconError> {
        self.send_now_logged(owner_id, recipient, content, self.options.log_send_now)
            .await
    }

    /// Send immediately, bypassing the queue.
    ///
    /// Failures are returned to the caller and never retried. When `log` is
    /// set, one terminal row records what happened.
    pub async fn send_now_logged(
        &self,
        owner_id: i64,
        recipient: &RecipientRef,
        content: ContentSpec,
        log: bool,
    ) -> Result<DeliveryResult, BeaconError> {
        let request =
            EnqueueRequest::new(owner_id, recipient.channel, recipient.address.clone(), content)
                .validate()?;
        self.registry.require(request.channel)?;
        let resolved = self
            .resolve_content(owner_id, request.channel, &request.content)
            .await?;

        let ctx = AttemptContext {
            message_id: None,
            owner_id,
            channel: request.channel,
            recipient: &request.recipient,
            attempt: 1,
        };
        let result = self.deliver(&ctx, &resolved.content).await;

        if log {
            let draft = draft_from(&request, resolved);
            let error = (!result.is_success()).then(|| result.error_summary());
            let id = self.store.insert_attempted(draft, error.as_deref()).await?;
            debug!(message_id = %id, "synchronous send logged");
        }
        Ok(result)
    }

    /// One delivery attempt for a claimed message, using its stored content.
    pub async fn attempt_send(&self, message: &Message) -> DeliveryResult {
        let ctx = AttemptContext {
            message_id: Some(message.id),
            owner_id: message.owner_id,
            channel: message.channel,
            recipient: &message.recipient,
            attempt: message.attempts + 1,
        };
        self.deliver(&ctx, &message.content).await
    }

    /// Render the owner's active template without persisting anything.
    pub async fn preview(
        &self,
        owner_id: i64,
        event_key: &str,
        channel: Channel,
        data: &TemplateData,
    ) -> Result<Option<RenderedContent>, BeaconError> {
        let template = self
            .templates
            .active_template(owner_id, event_key, channel)
            .await?;
        Ok(beacon_template::render(template.as_ref(), data))
    }

    async fn resolve_content(
        &self,
        owner_id: i64,
        channel: Channel,
        spec: &ContentSpec,
    ) -> Result<ResolvedContent, BeaconError> {
        match spec {
            ContentSpec::Rendered(content) => Ok(ResolvedContent {
                content: content.clone(),
                template_id: None,
            }),
            ContentSpec::Template {
                event_key,
                template_id: Some(id),
                data,
            } => {
                let template = self
                    .templates
                    .template_by_id(owner_id, *id)
                    .await?
                    .ok_or_else(|| BeaconError::NoTemplate {
                        owner_id,
                        event_key: event_key.clone(),
                        channel,
                    })?;
                if template.channel != channel {
                    return Err(BeaconError::Validation(format!(
                        "template {id} is for channel {}, not {channel}",
                        template.channel
                    )));
                }
                Ok(ResolvedContent {
                    content: beacon_template::render_template(&template, data),
                    template_id: Some(template.id),
                })
            }
            ContentSpec::Template {
                event_key, data, ..
            } => {
                let template = self
                    .templates
                    .active_template(owner_id, event_key, channel)
                    .await?;
                let content = beacon_template::render(template.as_ref(), data).ok_or_else(|| {
                    BeaconError::NoTemplate {
                        owner_id,
                        event_key: event_key.clone(),
                        channel,
                    }
                })?;
                let unresolved = beacon_template::unresolved(&content);
                if !unresolved.is_empty() {
                    warn!(
                        owner_id,
                        event_key = event_key.as_str(),
                        placeholders = ?unresolved,
                        "rendered content has unresolved placeholders"
                    );
                }
                Ok(ResolvedContent {
                    content,
                    template_id: template.map(|t| t.id),
                })
            }
        }
    }

    /// Resolve the adapter and credentials, call the provider under the send
    /// timeout, scrub the result, and emit the delivery log entry.
    async fn deliver(&self, ctx: &AttemptContext<'_>, content: &RenderedContent) -> DeliveryResult {
        let started = Instant::now();
        let (result, secrets) = self.call_provider(ctx, content).await;
        let result = scrub(result, &secrets);
        let elapsed = started.elapsed();

        metrics::record_attempt(ctx.channel, &result, elapsed.as_secs_f64());
        log_attempt(ctx, &result, elapsed);
        result
    }

    async fn call_provider(
        &self,
        ctx: &AttemptContext<'_>,
        content: &RenderedContent,
    ) -> (DeliveryResult, Vec<String>) {
        let Some(adapter) = self.registry.get(ctx.channel) else {
            return (
                DeliveryResult::permanent(format!(
                    "no adapter registered for channel {}",
                    ctx.channel
                )),
                Vec::new(),
            );
        };

        let credentials: ChannelCredentials =
            match self.credentials.credentials(ctx.owner_id, ctx.channel).await {
                Ok(Some(credentials)) => credentials,
                Ok(None) => {
                    return (
                        DeliveryResult::permanent(format!(
                            "no {} credentials configured for owner {}",
                            ctx.channel, ctx.owner_id
                        )),
                        Vec::new(),
                    );
                }
                // Only an unreachable store is worth retrying; unreadable
                // stored credentials stay unreadable.
                Err(e) if e.is_store_unavailable() => {
                    return (
                        DeliveryResult::retriable(format!("credential lookup failed: {e}")),
                        Vec::new(),
                    );
                }
                Err(e) => {
                    return (
                        DeliveryResult::permanent(format!("credential lookup failed: {e}")),
                        Vec::new(),
                    );
                }
            };
        let secrets = credentials.secret_values();

        let send = adapter.send(ctx.recipient, content, &credentials);
        let result = match tokio::time::timeout(self.options.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::retriable(format!(
                "provider call timed out after {}s",
                self.options.send_timeout.as_secs()
            )),
        };
        (result, secrets)
    }
}

fn draft_from(request: &ValidatedRequest, resolved: ResolvedContent) -> MessageDraft {
    MessageDraft {
        owner_id: request.owner_id,
        client_id: request.correlation.client_id,
        order_id: request.correlation.order_id,
        order_group_id: request.correlation.order_group_id,
        channel: request.channel,
        recipient: request.recipient.clone(),
        content: resolved.content,
        template_id: resolved.template_id,
        source_event: request.source_event.clone(),
        dedupe_key: request.dedupe_key.clone(),
        priority: request.priority,
        next_attempt_at: request.not_before(Utc::now()),
    }
}

/// Strip credential material from everything a result may carry into logs
/// or `last_error`.
fn scrub(mut result: DeliveryResult, secrets: &[String]) -> DeliveryResult {
    result.error = result.error.map(|e| redact(&e, secrets));
    result.provider_response = result.provider_response.map(|r| redact(&r, secrets));
    result
}

fn log_attempt(ctx: &AttemptContext<'_>, result: &DeliveryResult, elapsed: Duration) {
    let message_id = ctx.message_id.map(|id| id.0);
    let latency_ms = elapsed.as_millis() as u64;
    let outcome = metrics::outcome_label(result);
    if result.is_success() {
        info!(
            target: DELIVERY_TARGET,
            message_id,
            owner_id = ctx.owner_id,
            channel = %ctx.channel,
            attempt = ctx.attempt,
            provider_status = result.provider_status,
            provider_message_id = result.provider_message_id.as_deref(),
            outcome,
            latency_ms,
            "delivery attempt"
        );
    } else {
        warn!(
            target: DELIVERY_TARGET,
            message_id,
            owner_id = ctx.owner_id,
            channel = %ctx.channel,
            attempt = ctx.attempt,
            provider_status = result.provider_status,
            outcome,
            latency_ms,
            error = %result.error_summary(),
            "delivery attempt"
        );
    }
}
