// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-level records and the atomic transition description.
//!
//! Domain types live in `courier-core`; this module adds the bookkeeping the
//! database needs around them (lease holder, row version) and the shape of a
//! state transition written in one transaction.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use courier_core::{
    AttemptRecord, Channel, DeliveryRequest, DeliveryStatus, GeographyKey, Provider, RoutingRule,
    VoiceRule, ZonePolicy,
};
use rusqlite::types::Type;

/// Timestamp format used for every TEXT time column. Fixed width, so string
/// comparison matches chronological order.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// A request row together with its lease and version bookkeeping.
#[derive(Debug, Clone)]
pub struct StoredRequest {
    pub request: DeliveryRequest,
    /// Bumped by every write; admin and callback writes compare against it.
    pub version: i64,
    pub claimed_by: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
}

impl StoredRequest {
    /// Whether a worker currently holds an unexpired lease.
    pub fn lease_active(&self, now: DateTime<Utc>) -> bool {
        self.claimed_by.is_some() && self.lease_until.is_some_and(|until| until > now)
    }
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub id: String,
    /// `false` when an existing request with the same dedup key was returned.
    pub created: bool,
}

/// Precondition checked inside the transition's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionGuard {
    /// The named worker must still hold the lease.
    Lease { worker_id: String },
    /// The row must be unchanged since it was read, and no live lease may be
    /// held on it.
    Version { version: i64 },
}

/// Mutable request columns written by a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState {
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub attempt_floor: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub awaiting_callback: Option<String>,
    pub failure_reason: Option<String>,
}

impl RequestState {
    pub fn of(request: &DeliveryRequest) -> Self {
        Self {
            status: request.status,
            retry_count: request.retry_count,
            attempt_floor: request.attempt_floor,
            next_attempt_at: request.next_attempt_at,
            awaiting_callback: request.awaiting_callback.clone(),
            failure_reason: request.failure_reason.clone(),
        }
    }
}

/// Contribution of one attempt to the daily aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSample {
    pub day: NaiveDate,
    pub zone_code: String,
    pub channel: Channel,
    /// Counts a dispatch. Callback resolutions of an accepted dispatch do not.
    pub sent: bool,
    pub delivered: bool,
    pub failed: bool,
    pub latency_ms: u64,
    pub cost: f64,
}

impl MetricsSample {
    pub fn from_attempt(attempt: &AttemptRecord, zone_code: &str, sent: bool) -> Self {
        Self {
            day: attempt.attempted_at.date_naive(),
            zone_code: zone_code.to_string(),
            channel: attempt.channel,
            sent,
            delivered: attempt.outcome == courier_core::AttemptOutcome::Delivered,
            failed: attempt.outcome.is_failure(),
            latency_ms: attempt.latency_ms,
            cost: attempt.cost,
        }
    }
}

/// Audit entry to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor: String,
    pub action: String,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(actor: &str, action: &str, details: serde_json::Value) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
            details,
        }
    }
}

/// Committed metered spend for one geography key.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSpend {
    pub geography: GeographyKey,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

/// Everything written atomically for one state change of a request.
#[derive(Debug, Clone)]
pub struct Transition {
    pub request_id: String,
    pub guard: TransitionGuard,
    /// Verb used in the error when the guard fails (e.g. "abort").
    pub action: String,
    pub state: RequestState,
    /// Clear `claimed_by`/`lease_until`.
    pub release_lease: bool,
    pub attempt: Option<AttemptRecord>,
    pub metrics: Option<MetricsSample>,
    pub audit: Vec<NewAuditEntry>,
    pub spend: Option<BudgetSpend>,
    pub at: DateTime<Utc>,
}

/// Budget held for one request's metered attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetHold {
    pub request_id: String,
    pub geography: GeographyKey,
    pub amount: f64,
    pub reserved_at: DateTime<Utc>,
}

/// Spend for one geography key as seen inside a reservation: committed in
/// the current day and month, plus every outstanding hold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeldTotals {
    pub committed_day: f64,
    pub committed_month: f64,
    pub reserved: f64,
}

/// Result of a guarded reservation.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldDecision {
    /// The hold was written. Totals exclude it.
    Held(HeldTotals),
    Rejected(String),
}

/// All catalogs, read in one consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub zones: Vec<ZonePolicy>,
    pub providers: Vec<Provider>,
    pub routing_rules: Vec<RoutingRule>,
    pub voice_rules: Vec<VoiceRule>,
}
