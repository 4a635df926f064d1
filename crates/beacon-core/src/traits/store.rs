// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message store trait: the durable queue and its state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BeaconError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    InsertOutcome, Message, MessageDraft, MessageId, MessageStatus, StatusCounts,
};

/// Durable queue of outbound messages.
///
/// The store exclusively owns message rows. Every status change goes through
/// one of the named operations below, each of which checks the current status
/// so that a message only ever moves forward through its lifecycle.
#[async_trait]
pub trait MessageStore: PluginAdapter {
    /// Insert a draft as `queued` with zero attempts.
    ///
    /// Returns the existing id with `duplicate = true` when the owner already
    /// has a message with the same dedupe key.
    async fn insert(&self, draft: MessageDraft) -> Result<InsertOutcome, BeaconError>;

    /// Log a message sent outside the queue. The row is written terminal
    /// (`sent`, or `dead` with `error`) with one attempt and is never claimed.
    async fn insert_attempted(
        &self,
        draft: MessageDraft,
        error: Option<&str>,
    ) -> Result<MessageId, BeaconError>;

    /// Atomically move up to `limit` due `queued` messages to `sending` and
    /// return them. Concurrent callers never receive the same message.
    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Message>, BeaconError>;

    /// Extend the claim on a `sending` message to `now` plus the store's
    /// lease, provided it is still held under `held_until` and has not run
    /// out. `None` means the claim was lost and the message must not be sent.
    async fn renew_claim(
        &self,
        id: MessageId,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, BeaconError>;

    /// `sending -> sent`.
    async fn mark_sent(&self, id: MessageId) -> Result<(), BeaconError>;

    /// Record a retriable failure. Returns the resulting status: `queued`
    /// (eligible again at `next_attempt_at`) or `dead` once the retry budget
    /// is spent.
    async fn mark_failed(
        &self,
        id: MessageId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<MessageStatus, BeaconError>;

    /// Record a non-retriable failure: `sending -> dead`.
    async fn mark_failed_permanent(&self, id: MessageId, error: &str) -> Result<(), BeaconError>;

    /// Return `sending` messages whose claim lease expired before `now` to
    /// `queued` (or `dead` when out of attempts). Returns how many were moved.
    async fn recover_expired(&self, now: DateTime<Utc>) -> Result<u64, BeaconError>;

    /// Administrative cancellation of a still-`queued` message.
    async fn cancel(&self, id: MessageId, reason: &str) -> Result<(), BeaconError>;

    async fn get(&self, id: MessageId) -> Result<Option<Message>, BeaconError>;

    /// Newest first.
    async fn list_by_status(
        &self,
        status: MessageStatus,
        limit: usize,
    ) -> Result<Vec<Message>, BeaconError>;

    async fn count_by_status(&self) -> Result<StatusCounts, BeaconError>;

    /// Most recent message for the same owner, recipient and event created
    /// at or after `since`, ignoring `cancelled` and `dead` rows.
    async fn find_recent(
        &self,
        owner_id: i64,
        recipient: &str,
        source_event: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MessageId>, BeaconError>;
}
