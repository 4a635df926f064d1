// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Beacon dispatch pipeline.

use thiserror::Error;

use crate::types::{Channel, MessageId, MessageStatus};

/// The primary error type used across Beacon traits and core operations.
///
/// Delivery outcomes reported by channel adapters are values
/// ([`DeliveryResult`](crate::types::DeliveryResult)), not errors. Provider
/// timeouts and rejections never surface here.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Configuration errors (invalid TOML, missing provider settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed enqueue request: missing recipient, channel, or content.
    #[error("validation error: {0}")]
    Validation(String),

    /// Template-based content was requested but no active template matches.
    #[error("no active template for owner {owner_id}, event `{event_key}`, channel {channel}")]
    NoTemplate {
        owner_id: i64,
        event_key: String,
        channel: Channel,
    },

    /// The persistence layer could not be reached or a query failed.
    #[error("message store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The referenced message does not exist.
    #[error("message {id} not found")]
    NotFound { id: MessageId },

    /// A state transition was requested that the lifecycle does not allow.
    #[error("message {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Channel adapter construction or transport setup errors.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No adapter is registered for the requested channel.
    #[error("no adapter registered for channel {channel}")]
    AdapterNotFound { channel: Channel },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BeaconError {
    /// Whether this error came from the persistence layer.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, BeaconError::StoreUnavailable { .. })
    }
}
