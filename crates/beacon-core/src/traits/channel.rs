// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for outbound transports (chat platform, SMS, email).

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, ChannelCredentials, DeliveryResult, RenderedContent};

/// Sends one rendered message through an external provider.
///
/// Implementations never return errors for provider failures. Every outcome,
/// including transport errors, is folded into a [`DeliveryResult`] classified
/// as retriable or permanent so the worker can decide what happens next.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Delivers `content` to `recipient` using the owner's `credentials`.
    async fn send(
        &self,
        recipient: &str,
        content: &RenderedContent,
        credentials: &ChannelCredentials,
    ) -> DeliveryResult;
}
