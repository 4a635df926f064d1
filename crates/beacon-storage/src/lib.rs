// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Beacon dispatch pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, the durable
//! message queue with its guarded status transitions, and read access to the
//! externally owned template and credential tables.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::{SqliteStore, StoreOptions};
pub use database::Database;
