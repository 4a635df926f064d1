// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite columns and the core message model.
//!
//! Timestamps are stored as fixed-width UTC text
//! (`YYYY-MM-DDTHH:MM:SS.mmmZ`) so that string comparison in SQL matches
//! chronological order.

use std::str::FromStr;

use beacon_core::{Channel, ContentButton, Message, MessageId, MessageStatus, RenderedContent, Template};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a timestamp for storage.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
        })
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[derive(Debug)]
struct BadValue(String);

impl std::fmt::Display for BadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BadValue {}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| conversion_error(idx, BadValue(format!("bad timestamp `{raw}`"))))
}

fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, BadValue(format!("bad timestamp `{raw}`")))),
    }
}

fn enum_column<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|_| conversion_error(idx, BadValue(format!("unknown value `{raw}`"))))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// Column list matching [`message_from_row`].
pub const MESSAGE_COLUMNS: &str = "id, owner_id, client_id, order_id, order_group_id, channel, \
     recipient, content, template_id, status, priority, attempts, max_attempts, \
     next_attempt_at, locked_until, last_error, source_event, dedupe_key, created_at, updated_at";

/// Map a row selected with [`MESSAGE_COLUMNS`].
pub fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        owner_id: row.get(1)?,
        client_id: row.get(2)?,
        order_id: row.get(3)?,
        order_group_id: row.get(4)?,
        channel: enum_column::<Channel>(row, 5)?,
        recipient: row.get(6)?,
        content: json_column::<RenderedContent>(row, 7)?,
        template_id: row.get(8)?,
        status: enum_column::<MessageStatus>(row, 9)?,
        priority: row.get(10)?,
        attempts: row.get(11)?,
        max_attempts: row.get(12)?,
        next_attempt_at: opt_ts_column(row, 13)?,
        locked_until: opt_ts_column(row, 14)?,
        last_error: row.get(15)?,
        source_event: row.get(16)?,
        dedupe_key: row.get(17)?,
        created_at: ts_column(row, 18)?,
        updated_at: ts_column(row, 19)?,
    })
}

/// Column list matching [`template_from_row`].
pub const TEMPLATE_COLUMNS: &str =
    "id, owner_id, event_key, channel, subject, body_text, body_html, buttons, active, activated_at";

pub fn template_from_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        event_key: row.get(2)?,
        channel: enum_column::<Channel>(row, 3)?,
        subject: row.get(4)?,
        body_text: row.get(5)?,
        body_html: row.get(6)?,
        buttons: json_column::<Vec<ContentButton>>(row, 7)?,
        active: row.get(8)?,
        activated_at: opt_ts_column(row, 9)?,
    })
}

/// Parse a status value read on its own.
pub fn status_from_str(raw: &str) -> rusqlite::Result<MessageStatus> {
    MessageStatus::from_str(raw).map_err(|_| conversion_error(0, BadValue(format!("unknown status `{raw}`"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        let (fa, fb) = (format_ts(a), format_ts(b));
        assert_eq!(fa, "2026-01-02T03:04:05.000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_ts(&fb), Some(b));
    }

    #[test]
    fn sqlite_default_timestamps_parse() {
        // strftime('%Y-%m-%dT%H:%M:%fZ') output
        assert!(parse_ts("2026-03-01T10:00:00.123Z").is_some());
        assert!(parse_ts("yesterday").is_none());
    }
}
