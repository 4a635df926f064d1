// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Beacon message dispatch pipeline.
//!
//! This crate provides the message model, enqueue request validation, error
//! types, and the adapter traits that the store, the template source, and
//! each channel transport implement.

pub mod error;
pub mod request;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BeaconError;
pub use request::{
    normalize_recipient, ContentSpec, Correlation, EnqueueRequest, ValidatedRequest,
};
pub use types::{
    AdapterType, Channel, ChannelCredentials, ContentButton, DeliveryOutcome, DeliveryResult,
    FailureClass, HealthStatus, InsertOutcome, Message, MessageDraft, MessageId, MessageStatus,
    RecipientRef, RenderedContent, StatusCounts, Template, TemplateData,
};

// Re-export all adapter traits at crate root.
pub use traits::{ChannelAdapter, CredentialSource, MessageStore, PluginAdapter, TemplateSource};
