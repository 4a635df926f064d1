// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; whichever recorder the host process installs
//! collects these. Without a recorder every call is a no-op.

use beacon_core::{Channel, DeliveryResult, FailureClass};
use metrics::{describe_counter, describe_histogram};

/// Register all Beacon metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "beacon_messages_enqueued_total",
        "Messages inserted into the queue"
    );
    describe_counter!(
        "beacon_delivery_attempts_total",
        "Delivery attempts by channel and outcome"
    );
    describe_histogram!(
        "beacon_delivery_latency_seconds",
        "Provider call latency in seconds"
    );
    describe_counter!(
        "beacon_worker_claimed_total",
        "Messages claimed by worker passes"
    );
    describe_counter!(
        "beacon_notifications_suppressed_total",
        "Owner events suppressed by the reminder cooldown"
    );
}

/// Label value for a delivery outcome.
pub fn outcome_label(result: &DeliveryResult) -> &'static str {
    match result.failure_class() {
        None => "delivered",
        Some(FailureClass::Retriable) => "retriable",
        Some(FailureClass::Permanent) => "permanent",
    }
}

pub fn record_enqueued(channel: Channel) {
    metrics::counter!("beacon_messages_enqueued_total", "channel" => channel.to_string())
        .increment(1);
}

pub fn record_attempt(channel: Channel, result: &DeliveryResult, seconds: f64) {
    metrics::counter!(
        "beacon_delivery_attempts_total",
        "channel" => channel.to_string(),
        "outcome" => outcome_label(result)
    )
    .increment(1);
    metrics::histogram!("beacon_delivery_latency_seconds", "channel" => channel.to_string())
        .record(seconds);
}

pub fn record_claimed(count: usize) {
    metrics::counter!("beacon_worker_claimed_total").increment(count as u64);
}

pub fn record_suppressed(channel: Channel) {
    metrics::counter!("beacon_notifications_suppressed_total", "channel" => channel.to_string())
        .increment(1);
}
