// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message queue operations and the status state machine.
//!
//! Every transition is a guarded `UPDATE ... WHERE status = ...` so a row only
//! moves along `queued -> sending -> sent | queued | dead` or
//! `queued -> cancelled`. Read-modify-write sequences run inside
//! `BEGIN IMMEDIATE` so concurrent processes serialize on the write lock.

use std::cmp::Reverse;

use beacon_core::{
    BeaconError, InsertOutcome, Message, MessageDraft, MessageId, MessageStatus, StatusCounts,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::database::{map_tr_err, Database};
use crate::models::{format_ts, message_from_row, status_from_str, MESSAGE_COLUMNS};

/// `last_error` recorded when a claim lease runs out.
pub const LEASE_EXPIRED_ERROR: &str = "claim lease expired";

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Build the error for a transition that matched no row.
fn rejected(
    conn: &Connection,
    id: MessageId,
    to: MessageStatus,
) -> rusqlite::Result<BeaconError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM messages WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match current {
        None => BeaconError::NotFound { id },
        Some(raw) => BeaconError::InvalidTransition {
            id,
            from: status_from_str(&raw)?,
            to,
        },
    })
}

/// Insert a new `queued` message. A repeated `(owner_id, dedupe_key)` returns
/// the first message's id and inserts nothing.
pub async fn insert(
    db: &Database,
    draft: MessageDraft,
    max_attempts: u32,
) -> Result<InsertOutcome, BeaconError> {
    if draft.recipient.trim().is_empty() {
        return Err(BeaconError::Validation(
            "missing recipient address".to_string(),
        ));
    }
    if max_attempts == 0 {
        return Err(BeaconError::Validation(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    let content = serde_json::to_string(&draft.content)
        .map_err(|e| BeaconError::Internal(format!("failed to encode message content: {e}")))?;
    let now = format_ts(Utc::now());

    db.connection()
        .call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(key) = &draft.dedupe_key {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM messages WHERE owner_id = ?1 AND dedupe_key = ?2",
                        params![draft.owner_id, key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    tx.commit()?;
                    return Ok(InsertOutcome {
                        id: MessageId(id),
                        duplicate: true,
                    });
                }
            }

            tx.execute(
                "INSERT INTO messages (owner_id, client_id, order_id, order_group_id, channel,
                     recipient, content, template_id, status, priority, attempts, max_attempts,
                     next_attempt_at, source_event, dedupe_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'queued', ?9, 0, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    draft.owner_id,
                    draft.client_id,
                    draft.order_id,
                    draft.order_group_id,
                    draft.channel.as_ref(),
                    draft.recipient,
                    content,
                    draft.template_id,
                    draft.priority,
                    max_attempts,
                    draft.next_attempt_at.map(format_ts),
                    draft.source_event,
                    draft.dedupe_key,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(InsertOutcome {
                id: MessageId(id),
                duplicate: false,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Log a message that was sent outside the queue.
///
/// The row is written already terminal with one attempt: `sent` when
/// `error` is `None`, `dead` with `last_error` otherwise. It is never
/// claimed.
pub async fn insert_attempted(
    db: &Database,
    draft: MessageDraft,
    max_attempts: u32,
    error: Option<&str>,
) -> Result<MessageId, BeaconError> {
    if draft.recipient.trim().is_empty() {
        return Err(BeaconError::Validation(
            "missing recipient address".to_string(),
        ));
    }
    let content = serde_json::to_string(&draft.content)
        .map_err(|e| BeaconError::Internal(format!("failed to encode message content: {e}")))?;
    let status = match error {
        None => MessageStatus::Sent,
        Some(_) => MessageStatus::Dead,
    };
    let error = error.map(str::to_string);
    let now = format_ts(Utc::now());

    db.connection()
        .call(move |conn| -> Result<MessageId, rusqlite::Error> {
            conn.execute(
                "INSERT INTO messages (owner_id, client_id, order_id, order_group_id, channel,
                     recipient, content, template_id, status, priority, attempts, max_attempts,
                     last_error, source_event, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?13, ?14, ?14)",
                params![
                    draft.owner_id,
                    draft.client_id,
                    draft.order_id,
                    draft.order_group_id,
                    draft.channel.as_ref(),
                    draft.recipient,
                    content,
                    draft.template_id,
                    status.as_ref(),
                    draft.priority,
                    max_attempts.max(1),
                    error,
                    draft.source_event,
                    now,
                ],
            )?;
            Ok(MessageId(conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim up to `limit` due messages, moving them to `sending`
/// with a lease ending at `now + lease`.
///
/// Returned in claim order: priority descending, then due time, then id.
pub async fn claim_due(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Vec<Message>, BeaconError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let now_s = format_ts(now);
    let locked_until = format_ts(now + lease);
    let sql = format!(
        "UPDATE messages
         SET status = 'sending', locked_until = ?1, updated_at = ?2
         WHERE status = 'queued' AND id IN (
             SELECT id FROM messages
             WHERE status = 'queued' AND (next_attempt_at IS NULL OR next_attempt_at <= ?2)
             ORDER BY priority DESC, COALESCE(next_attempt_at, created_at) ASC, id ASC
             LIMIT ?3
         )
         RETURNING {MESSAGE_COLUMNS}"
    );

    let mut claimed = db
        .connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let claimed = {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![locked_until, now_s, sql_limit(limit)],
                    message_from_row,
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)?;

    claimed.sort_by_key(|m| {
        (
            Reverse(m.priority),
            m.next_attempt_at.unwrap_or(m.created_at),
            m.id,
        )
    });
    Ok(claimed)
}

/// Extend a claim to `now + lease` right before its provider call.
///
/// The row must still be `sending` under the exact lease the caller was
/// handed (`held_until`) and that lease must not have run out. Returns the
/// new lease end, or `None` when the claim was lost to lease recovery and
/// the message must not be sent.
pub async fn renew_claim(
    db: &Database,
    id: MessageId,
    held_until: DateTime<Utc>,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<DateTime<Utc>>, BeaconError> {
    let held = format_ts(held_until);
    let now_s = format_ts(now);
    let renewed = (now + lease).trunc_subsecs(3);
    let locked_until = format_ts(renewed);
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE messages
                 SET locked_until = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'sending'
                   AND locked_until = ?4 AND locked_until >= ?2",
                params![locked_until, now_s, id.0, held],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok((changed == 1).then_some(renewed))
}

/// `sending -> sent`. Counts the successful attempt.
pub async fn mark_sent(db: &Database, id: MessageId) -> Result<(), BeaconError> {
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<Result<(), BeaconError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = 'sent', attempts = attempts + 1, locked_until = NULL,
                     next_attempt_at = NULL, updated_at = ?1
                 WHERE id = ?2 AND status = 'sending'",
                params![now, id.0],
            )?;
            if changed == 1 {
                Ok(Ok(()))
            } else {
                Ok(Err(rejected(conn, id, MessageStatus::Sent)?))
            }
        })
        .await
        .map_err(map_tr_err)?
}

/// Record a retriable failure on a `sending` message.
///
/// Increments `attempts`; the message goes back to `queued` at
/// `next_attempt_at`, or to `dead` once `attempts` reaches `max_attempts`.
pub async fn mark_failed(
    db: &Database,
    id: MessageId,
    error: &str,
    next_attempt_at: DateTime<Utc>,
) -> Result<MessageStatus, BeaconError> {
    let error = error.to_string();
    let next = format_ts(next_attempt_at);
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<Result<MessageStatus, BeaconError>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row: Option<(String, u32, u32)> = tx
                .query_row(
                    "SELECT status, attempts, max_attempts FROM messages WHERE id = ?1",
                    params![id.0],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((status, attempts, max_attempts)) = row else {
                return Ok(Err(BeaconError::NotFound { id }));
            };
            let from = status_from_str(&status)?;
            if from != MessageStatus::Sending {
                return Ok(Err(BeaconError::InvalidTransition {
                    id,
                    from,
                    to: MessageStatus::Queued,
                }));
            }

            let attempts = attempts + 1;
            let outcome = if attempts >= max_attempts {
                tx.execute(
                    "UPDATE messages
                     SET status = 'dead', attempts = ?1, last_error = ?2, locked_until = NULL,
                         next_attempt_at = NULL, updated_at = ?3
                     WHERE id = ?4 AND status = 'sending'",
                    params![attempts, error, now, id.0],
                )?;
                MessageStatus::Dead
            } else {
                tx.execute(
                    "UPDATE messages
                     SET status = 'queued', attempts = ?1, last_error = ?2, locked_until = NULL,
                         next_attempt_at = ?3, updated_at = ?4
                     WHERE id = ?5 AND status = 'sending'",
                    params![attempts, error, next, now, id.0],
                )?;
                MessageStatus::Queued
            };
            tx.commit()?;
            Ok(Ok(outcome))
        })
        .await
        .map_err(map_tr_err)?
}

/// Record a non-retriable failure: `sending -> dead` in one step.
pub async fn mark_failed_permanent(
    db: &Database,
    id: MessageId,
    error: &str,
) -> Result<(), BeaconError> {
    let error = error.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<Result<(), BeaconError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = 'dead', attempts = attempts + 1, last_error = ?1,
                     locked_until = NULL, next_attempt_at = NULL, updated_at = ?2
                 WHERE id = ?3 AND status = 'sending'",
                params![error, now, id.0],
            )?;
            if changed == 1 {
                Ok(Ok(()))
            } else {
                Ok(Err(rejected(conn, id, MessageStatus::Dead)?))
            }
        })
        .await
        .map_err(map_tr_err)?
}

/// Return `sending` messages whose lease ended before `now` to the queue.
///
/// The abandoned attempt counts against the budget, so a message that keeps
/// crashing its worker still ends up `dead`.
pub async fn recover_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, BeaconError> {
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = CASE WHEN attempts + 1 >= max_attempts THEN 'dead' ELSE 'queued' END,
                     next_attempt_at = CASE WHEN attempts + 1 >= max_attempts THEN NULL ELSE ?1 END,
                     attempts = attempts + 1,
                     last_error = ?2,
                     locked_until = NULL,
                     updated_at = ?1
                 WHERE status = 'sending' AND locked_until IS NOT NULL AND locked_until < ?1",
                params![now, LEASE_EXPIRED_ERROR],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// `queued -> cancelled`. Anything else is an invalid transition.
pub async fn cancel(db: &Database, id: MessageId, reason: &str) -> Result<(), BeaconError> {
    let reason = reason.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<Result<(), BeaconError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = 'cancelled', last_error = ?1, next_attempt_at = NULL, updated_at = ?2
                 WHERE id = ?3 AND status = 'queued'",
                params![reason, now, id.0],
            )?;
            if changed == 1 {
                Ok(Ok(()))
            } else {
                Ok(Err(rejected(conn, id, MessageStatus::Cancelled)?))
            }
        })
        .await
        .map_err(map_tr_err)?
}

pub async fn get(db: &Database, id: MessageId) -> Result<Option<Message>, BeaconError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(&sql, params![id.0], message_from_row).optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages in `status`, most recently updated first.
pub async fn list_by_status(
    db: &Database,
    status: MessageStatus,
    limit: usize,
) -> Result<Vec<Message>, BeaconError> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE status = ?1
         ORDER BY updated_at DESC, id DESC LIMIT ?2"
    );
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![status.as_ref(), sql_limit(limit)],
                message_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Count of messages per status. Every status is present, zero or not.
pub async fn count_by_status(db: &Database) -> Result<StatusCounts, BeaconError> {
    let rows = db
        .connection()
        .call(|conn| -> Result<Vec<(String, u64)>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM messages GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let mut counts: StatusCounts = [
        MessageStatus::Queued,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Dead,
        MessageStatus::Cancelled,
    ]
    .into_iter()
    .map(|s| (s, 0))
    .collect();
    for (raw, count) in rows {
        let status = status_from_str(&raw).map_err(|e| BeaconError::StoreUnavailable {
            source: Box::new(e),
        })?;
        counts.insert(status, count);
    }
    Ok(counts)
}

/// Most recent message for (owner, recipient, event) created at or after
/// `since` that is still on its way or arrived.
///
/// `cancelled` and `dead` rows are ignored: neither reached the recipient.
pub async fn find_recent(
    db: &Database,
    owner_id: i64,
    recipient: &str,
    source_event: &str,
    since: DateTime<Utc>,
) -> Result<Option<MessageId>, BeaconError> {
    let recipient = recipient.to_string();
    let source_event = source_event.to_string();
    let since = format_ts(since);
    db.connection()
        .call(move |conn| -> Result<Option<MessageId>, rusqlite::Error> {
            conn.query_row(
                "SELECT id FROM messages
                 WHERE owner_id = ?1 AND recipient = ?2 AND source_event = ?3
                   AND status NOT IN ('cancelled', 'dead') AND created_at >= ?4
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![owner_id, recipient, source_event, since],
                |row| row.get(0).map(MessageId),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
