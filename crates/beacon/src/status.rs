// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `beacon status` command implementation.
//!
//! Prints the number of messages in each lifecycle status, or structured JSON
//! with `--json` for scripting.

use std::collections::BTreeMap;

use beacon_core::{BeaconError, MessageStatus, MessageStore, StatusCounts};
use serde::Serialize;

use crate::app::App;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database: String,
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

impl StatusResponse {
    fn new(database: &str, counts: &StatusCounts) -> Self {
        Self {
            database: database.to_string(),
            counts: counts.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
            total: counts.values().sum(),
        }
    }
}

/// Run the `beacon status` command.
pub async fn run_status(app: &App, json: bool) -> Result<(), BeaconError> {
    let counts = app.store.count_by_status().await?;
    if json {
        let response = StatusResponse::new(&app.config.storage.database_path, &counts);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", render_table(&app.config.storage.database_path, &counts));
    }
    Ok(())
}

fn render_table(database: &str, counts: &StatusCounts) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str("  beacon status\n");
    out.push_str(&format!("  {}\n", "-".repeat(35)));
    out.push_str(&format!("    Database:  {database}\n"));
    for status in [
        MessageStatus::Queued,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Dead,
        MessageStatus::Cancelled,
    ] {
        let count = counts.get(&status).copied().unwrap_or(0);
        out.push_str(&format!("    {:<10} {count:>8}\n", format!("{status}:")));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> StatusCounts {
        [
            (MessageStatus::Queued, 3),
            (MessageStatus::Sent, 10),
            (MessageStatus::Dead, 1),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn table_lists_every_status() {
        let table = render_table("beacon.db", &counts());
        assert!(table.contains("queued:"));
        assert!(table.contains("sending:"));
        assert!(table.contains("cancelled:"));
        assert!(table.contains("beacon.db"));
    }

    #[test]
    fn status_response_serializes() {
        let response = StatusResponse::new("beacon.db", &counts());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"queued\":3"));
        assert!(json.contains("\"total\":14"));
    }
}
