// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Beacon pipeline.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod source;
pub mod store;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use source::{CredentialSource, TemplateSource};
pub use store::MessageStore;
