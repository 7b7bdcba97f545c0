// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.

use courier_core::{AttemptOutcome, Channel, DeliveryStatus};
use metrics::{describe_counter, describe_histogram};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "courier_attempts_total",
        "Provider attempts by channel, zone and outcome"
    );
    describe_counter!(
        "courier_terminal_total",
        "Requests reaching a terminal status"
    );
    describe_histogram!(
        "courier_attempt_latency_seconds",
        "Provider attempt latency in seconds"
    );
    describe_counter!(
        "courier_cost_usd_total",
        "Committed delivery cost in millionths of the zone currency"
    );
    describe_counter!("courier_claimed_total", "Requests claimed by workers");
    describe_counter!(
        "courier_budget_rejections_total",
        "Metered attempts skipped because a budget cap would be exceeded"
    );
}

/// Record one provider attempt.
pub fn record_attempt(channel: Channel, zone_code: &str, outcome: AttemptOutcome, latency_ms: u64, cost: f64) {
    metrics::counter!(
        "courier_attempts_total",
        "channel" => channel.to_string(),
        "zone" => zone_code.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("courier_attempt_latency_seconds", "channel" => channel.to_string())
        .record(latency_ms as f64 / 1000.0);
    if cost > 0.0 {
        metrics::counter!("courier_cost_usd_total", "channel" => channel.to_string())
            .increment((cost * 1_000_000.0).round() as u64);
    }
}

/// Record a terminal transition.
pub fn record_terminal(status: DeliveryStatus, zone_code: &str) {
    metrics::counter!(
        "courier_terminal_total",
        "status" => status.to_string(),
        "zone" => zone_code.to_string()
    )
    .increment(1);
}

/// Record a claimed batch.
pub fn record_claimed(count: usize) {
    metrics::counter!("courier_claimed_total").increment(count as u64);
}

pub fn record_budget_rejection(geography: &str) {
    metrics::counter!("courier_budget_rejections_total", "geography" => geography.to_string())
        .increment(1);
}
