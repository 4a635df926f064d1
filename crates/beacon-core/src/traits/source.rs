// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only lookups against externally owned template and settings storage.

use async_trait::async_trait;

use crate::error::BeaconError;
use crate::types::{Channel, ChannelCredentials, Template};

/// Template lookup by (owner, event key, channel).
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// The single active template for the key triple, if any.
    ///
    /// When several active rows match, the most recently activated wins,
    /// then the highest id.
    async fn active_template(
        &self,
        owner_id: i64,
        event_key: &str,
        channel: Channel,
    ) -> Result<Option<Template>, BeaconError>;

    /// A specific template owned by `owner_id`, active or not.
    async fn template_by_id(
        &self,
        owner_id: i64,
        template_id: i64,
    ) -> Result<Option<Template>, BeaconError>;
}

/// Per-owner provider credentials. Implementations must not cache across
/// calls so rotated credentials take effect on the next send.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(
        &self,
        owner_id: i64,
        channel: Channel,
    ) -> Result<Option<ChannelCredentials>, BeaconError>;
}
