// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Beacon integration tests.
//!
//! Provides scripted adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external providers.
//!
//! # Components
//!
//! - [`ScriptedChannel`] - Channel adapter with per-recipient scripted outcomes
//! - [`StaticTemplates`] / [`StaticCredentials`] - In-memory lookup sources
//! - [`TestHarness`] - Temp SQLite store plus one scripted channel per channel

pub mod harness;
pub mod scripted_channel;
pub mod static_sources;

pub use harness::TestHarness;
pub use scripted_channel::{ScriptedChannel, SentRecord};
pub use static_sources::{template, StaticCredentials, StaticTemplates};
