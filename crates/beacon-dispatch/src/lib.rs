// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch engine for the Beacon pipeline.
//!
//! - [`Dispatcher`] validates and renders enqueue requests, sends synchronously
//!   on request, and performs single delivery attempts for the worker.
//! - [`Worker`] claims due messages and records outcomes with [`RetryPolicy`].
//! - [`NotificationEngine`] applies owner-event policy before enqueueing.
//! - [`AdapterRegistry`] selects the channel adapter for each message.

pub mod dispatcher;
pub mod metrics;
pub mod notify;
pub mod redact;
pub mod registry;
pub mod retry;
pub mod worker;

pub use dispatcher::{DispatchOptions, Dispatcher, DELIVERY_TARGET};
pub use notify::{NotificationEngine, NotifyOutcome, OwnerEvent, SkipReason};
pub use registry::AdapterRegistry;
pub use retry::RetryPolicy;
pub use worker::{PassReport, Worker, WorkerOptions};
