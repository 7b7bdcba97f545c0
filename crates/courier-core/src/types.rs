// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by every Courier crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CourierError;

/// A delivery medium.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Sms,
    Email,
    Ussd,
    Voice,
    Webhook,
}

impl Channel {
    /// Channels whose spend is capped by the budget guard.
    pub fn is_metered(self) -> bool {
        matches!(self, Channel::Voice)
    }
}

/// Request priority. Ordering follows declaration order (`Low < Urgent`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank persisted for claim ordering.
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }

    pub fn from_rank(rank: i64) -> Self {
        match rank {
            i64::MIN..=0 => Priority::Low,
            1 => Priority::Normal,
            2 => Priority::High,
            _ => Priority::Urgent,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Lifecycle status of a delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Aborted,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// Result of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Provider confirmed delivery.
    Delivered,
    /// Asynchronous provider accepted the request; the result arrives by callback.
    Accepted,
    /// Retry-eligible failure.
    TransientFailure,
    /// Non-retryable failure.
    PermanentFailure,
    /// The attempt (or the callback window) exceeded its time bound.
    Timeout,
}

impl AttemptOutcome {
    /// Whether this record consumes one unit of the zone's retry budget.
    ///
    /// `Accepted` is an interim record: its final result is recorded
    /// separately when the callback (or its timeout) arrives.
    pub fn counts_toward_retries(self) -> bool {
        !matches!(self, AttemptOutcome::Accepted)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            AttemptOutcome::TransientFailure
                | AttemptOutcome::PermanentFailure
                | AttemptOutcome::Timeout
        )
    }
}

/// One immutable entry in a request's attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub provider_id: String,
    pub channel: Channel,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    /// Cost incurred in the provider's currency (0 for failures).
    pub cost: f64,
    /// Raw detail returned by the provider.
    pub detail: String,
    /// Vendor-side identifier, used to match asynchronous callbacks.
    pub provider_request_id: Option<String>,
}

/// Append-only, ordered attempt history.
///
/// Records can be appended and read but never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptLog(Vec<AttemptRecord>);

impl AttemptLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Rebuild a log from persisted records (already in sequence order).
    pub fn from_records(records: Vec<AttemptRecord>) -> Self {
        Self(records)
    }

    pub fn append(&mut self, record: AttemptRecord) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AttemptRecord> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.0.last()
    }

    pub fn as_slice(&self) -> &[AttemptRecord] {
        &self.0
    }

    /// Attempts that count toward the retry budget, ignoring the first
    /// `floor` records (history kept across an admin requeue).
    pub fn counted_since(&self, floor: usize) -> u32 {
        self.0
            .iter()
            .skip(floor)
            .filter(|a| a.outcome.counts_toward_retries())
            .count() as u32
    }
}

/// Local-time window during which non-urgent delivery is deferred.
///
/// `start > end` denotes a window crossing midnight (e.g. 22:00-07:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// IANA zone name (e.g. "Africa/Dakar"). `None` means UTC.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Per-subject delivery preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Channels the subject has opted out of.
    #[serde(default)]
    pub disabled_channels: Vec<Channel>,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

impl UserPreferences {
    pub fn allows(&self, channel: Channel) -> bool {
        !self.disabled_channels.contains(&channel)
    }
}

/// Input to `enqueue`. Validated before anything is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDeliveryRequest {
    /// Caller-supplied idempotency key.
    #[serde(default)]
    pub dedup_key: Option<String>,
    pub subject_ref: String,
    pub event_type: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    pub country: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub zone_code: String,
    pub language: String,
    pub currency: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub preferences: UserPreferences,
}

impl NewDeliveryRequest {
    /// Check required fields. Returns every problem in one message.
    pub fn validate(&self) -> Result<(), CourierError> {
        let mut problems = Vec::new();
        if self.channel.is_none() {
            problems.push("channel is required");
        }
        if payload_is_empty(&self.payload) {
            problems.push("payload must not be empty");
        }
        if self.subject_ref.trim().is_empty() {
            problems.push("subject_ref must not be empty");
        }
        if self.event_type.trim().is_empty() {
            problems.push("event_type must not be empty");
        }
        if self.country.trim().is_empty() {
            problems.push("country must not be empty");
        }
        if self.zone_code.trim().is_empty() {
            problems.push("zone_code must not be empty");
        }
        if self.language.trim().is_empty() {
            problems.push("language must not be empty");
        }
        if self.currency.trim().is_empty() {
            problems.push("currency must not be empty");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CourierError::Validation(problems.join("; ")))
        }
    }

    /// Build the persisted request. Call [`validate`](Self::validate) first.
    pub fn into_request(self, id: String, now: DateTime<Utc>) -> Result<DeliveryRequest, CourierError> {
        self.validate()?;
        let channel = self
            .channel
            .ok_or_else(|| CourierError::Validation("channel is required".into()))?;
        Ok(DeliveryRequest {
            id,
            dedup_key: self.dedup_key,
            subject_ref: self.subject_ref,
            event_type: self.event_type,
            channel,
            country: self.country.trim().to_uppercase(),
            region: self.region,
            city: self.city,
            zone_code: self.zone_code,
            language: self.language,
            currency: self.currency,
            payload: self.payload,
            priority: self.priority,
            preferences: self.preferences,
            status: DeliveryStatus::Pending,
            attempts: AttemptLog::new(),
            retry_count: 0,
            attempt_floor: 0,
            next_attempt_at: now,
            awaiting_callback: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }
}

fn payload_is_empty(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// A persisted notification delivery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: String,
    pub dedup_key: Option<String>,
    pub subject_ref: String,
    pub event_type: String,
    /// Channel requested by the producer; leads the default order when no rule matches.
    pub channel: Channel,
    pub country: String,
    pub region: Option<String>,
    pub city: Option<String>,
    pub zone_code: String,
    pub language: String,
    pub currency: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub preferences: UserPreferences,
    pub status: DeliveryStatus,
    pub attempts: AttemptLog,
    /// Completed retry cycles (drives the backoff exponent).
    pub retry_count: u32,
    /// Number of attempt records that predate the last admin requeue.
    pub attempt_floor: u32,
    pub next_attempt_at: DateTime<Utc>,
    /// Vendor id of an accepted asynchronous attempt awaiting its callback.
    pub awaiting_callback: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRequest {
    /// Attempts consumed from the current retry budget.
    pub fn counted_attempts(&self) -> u32 {
        self.attempts.counted_since(self.attempt_floor as usize)
    }
}

/// Result of `getStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatusView {
    pub request_id: String,
    pub status: DeliveryStatus,
    pub attempts: Vec<AttemptRecord>,
    pub next_attempt_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl From<&DeliveryRequest> for DeliveryStatusView {
    fn from(request: &DeliveryRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            status: request.status,
            attempts: request.attempts.as_slice().to_vec(),
            next_attempt_at: request.next_attempt_at,
            failure_reason: request.failure_reason.clone(),
        }
    }
}

/// Per-zone channel switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlags {
    pub push: bool,
    pub sms: bool,
    pub email: bool,
    pub ussd: bool,
    pub voice: bool,
    pub webhook: bool,
}

impl ChannelFlags {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.push,
            Channel::Sms => self.sms,
            Channel::Email => self.email,
            Channel::Ussd => self.ussd,
            Channel::Voice => self.voice,
            Channel::Webhook => self.webhook,
        }
    }
}

impl Default for ChannelFlags {
    fn default() -> Self {
        Self {
            push: true,
            sms: true,
            email: true,
            ussd: true,
            voice: true,
            webhook: true,
        }
    }
}

/// Routing, retry, and pricing policy for a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePolicy {
    pub zone_code: String,
    #[serde(default)]
    pub channels: ChannelFlags,
    pub max_backoff_seconds: u64,
    pub max_retries: u32,
    pub min_fee: f64,
    pub max_fee: f64,
    pub markup_pct: f64,
}

impl ZonePolicy {
    pub fn validate(&self) -> Result<(), CourierError> {
        if self.zone_code.trim().is_empty() {
            return Err(CourierError::Validation("zone_code must not be empty".into()));
        }
        if self.min_fee < 0.0 || self.max_fee < self.min_fee {
            return Err(CourierError::Validation(format!(
                "zone {}: fee bounds must satisfy 0 <= min_fee <= max_fee (got {} / {})",
                self.zone_code, self.min_fee, self.max_fee
            )));
        }
        if self.markup_pct < -100.0 {
            return Err(CourierError::Validation(format!(
                "zone {}: markup_pct must be >= -100, got {}",
                self.zone_code, self.markup_pct
            )));
        }
        if self.max_retries == 0 {
            return Err(CourierError::Validation(format!(
                "zone {}: max_retries must be at least 1",
                self.zone_code
            )));
        }
        Ok(())
    }

    /// Apply a partial update.
    pub fn apply(&mut self, patch: &ZonePolicyPatch) {
        if let Some(channels) = patch.channels {
            self.channels = channels;
        }
        if let Some(v) = patch.max_backoff_seconds {
            self.max_backoff_seconds = v;
        }
        if let Some(v) = patch.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = patch.min_fee {
            self.min_fee = v;
        }
        if let Some(v) = patch.max_fee {
            self.max_fee = v;
        }
        if let Some(v) = patch.markup_pct {
            self.markup_pct = v;
        }
    }
}

/// Fields accepted by `adminUpdateZonePolicy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonePolicyPatch {
    pub channels: Option<ChannelFlags>,
    pub max_backoff_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
    pub markup_pct: Option<f64>,
}

/// Languages and regions a provider is able to serve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapability {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl ProviderCapability {
    /// Whether the capability covers the subject's region or language.
    pub fn covers(&self, region: Option<&str>, language: &str) -> bool {
        let region_match = region
            .map(|r| self.regions.iter().any(|c| c.eq_ignore_ascii_case(r)))
            .unwrap_or(false);
        let language_match = self
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language));
        region_match || language_match
    }
}

/// Catalog entry for a vendor integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    /// `None` means the provider serves every zone.
    pub zone_code: Option<String>,
    pub priority: i32,
    pub base_cost: f64,
    pub currency: String,
    pub active: bool,
    #[serde(default)]
    pub capability: ProviderCapability,
}

/// Wildcard accepted in routing rule keys.
pub const ANY: &str = "*";

/// Channel nomination for a (country, event type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub country: String,
    pub event_type: String,
    pub primary_channel: Channel,
    pub fallback_channel: Option<Channel>,
}

/// Geography scope of a voice rule or budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GeographyKey {
    City { country: String, city: String },
    Country(String),
    Region(String),
    Default,
}

impl fmt::Display for GeographyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeographyKey::City { country, city } => write!(f, "city:{country}:{city}"),
            GeographyKey::Country(country) => write!(f, "country:{country}"),
            GeographyKey::Region(region) => write!(f, "region:{region}"),
            GeographyKey::Default => write!(f, "default"),
        }
    }
}

impl FromStr for GeographyKey {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CourierError::Validation(format!("invalid geography key `{s}`"));
        if s == "default" {
            return Ok(GeographyKey::Default);
        }
        let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }
        match kind {
            "country" => Ok(GeographyKey::Country(rest.to_uppercase())),
            "region" => Ok(GeographyKey::Region(rest.to_string())),
            "city" => {
                let (country, city) = rest.split_once(':').ok_or_else(invalid)?;
                if country.is_empty() || city.is_empty() {
                    return Err(invalid());
                }
                Ok(GeographyKey::City {
                    country: country.to_uppercase(),
                    city: city.to_string(),
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for GeographyKey {
    type Error = CourierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeographyKey> for String {
    fn from(key: GeographyKey) -> Self {
        key.to_string()
    }
}

/// Local hour window `[start_hour, end_hour)`; wraps midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Geography-scoped voice policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceRule {
    pub geography: GeographyKey,
    pub fallback_enabled: bool,
    pub fallback_delay_seconds: u64,
    pub max_message_seconds: u32,
    pub budget_daily_usd: Option<f64>,
    pub budget_monthly_usd: Option<f64>,
    pub allowed_hours: Option<HourWindow>,
    #[serde(default)]
    pub preferred_providers: Vec<String>,
}

impl Default for VoiceRule {
    fn default() -> Self {
        Self {
            geography: GeographyKey::Default,
            fallback_enabled: true,
            fallback_delay_seconds: 60,
            max_message_seconds: 60,
            budget_daily_usd: None,
            budget_monthly_usd: None,
            allowed_hours: None,
            preferred_providers: Vec::new(),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// `None` for catalog mutations that do not concern a single request.
    pub request_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Daily per-zone, per-channel delivery counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsAggregate {
    pub day: NaiveDate,
    pub zone_code: String,
    pub channel: Channel,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request() -> NewDeliveryRequest {
        NewDeliveryRequest {
            subject_ref: "user-1".into(),
            event_type: "wallet.p2p.succeeded".into(),
            channel: Some(Channel::Sms),
            country: "sn".into(),
            zone_code: "WAEMU".into(),
            language: "fr".into(),
            currency: "XOF".into(),
            payload: serde_json::json!({"body": "hello"}),
            ..NewDeliveryRequest::default()
        }
    }

    #[test]
    fn missing_channel_and_payload_are_rejected() {
        let mut req = new_request();
        req.channel = None;
        req.payload = serde_json::Value::Null;
        let err = req.validate().unwrap_err().to_string();
        assert!(err.contains("channel is required"), "got: {err}");
        assert!(err.contains("payload must not be empty"), "got: {err}");
    }

    #[test]
    fn into_request_normalizes_country_and_starts_pending() {
        let now = Utc::now();
        let req = new_request().into_request("r1".into(), now).unwrap();
        assert_eq!(req.country, "SN");
        assert_eq!(req.status, DeliveryStatus::Pending);
        assert_eq!(req.next_attempt_at, now);
        assert!(req.attempts.is_empty());
    }

    #[test]
    fn accepted_attempts_do_not_consume_retries() {
        let record = |outcome| AttemptRecord {
            provider_id: "p".into(),
            channel: Channel::Voice,
            attempted_at: Utc::now(),
            outcome,
            latency_ms: 1,
            cost: 0.0,
            detail: String::new(),
            provider_request_id: None,
        };
        let mut log = AttemptLog::new();
        log.append(record(AttemptOutcome::TransientFailure));
        log.append(record(AttemptOutcome::Accepted));
        log.append(record(AttemptOutcome::Timeout));
        assert_eq!(log.len(), 3);
        assert_eq!(log.counted_since(0), 2);
        assert_eq!(log.counted_since(1), 1);
    }

    #[test]
    fn newest_matching_attempt_is_found_from_the_back() {
        let accepted = |vendor: &str| AttemptRecord {
            provider_id: "p".into(),
            channel: Channel::Voice,
            attempted_at: Utc::now(),
            outcome: AttemptOutcome::Accepted,
            latency_ms: 1,
            cost: 0.0,
            detail: vendor.to_string(),
            provider_request_id: Some("call-1".into()),
        };
        let log = AttemptLog::from_records(vec![accepted("first"), accepted("second")]);
        let newest = log
            .iter()
            .rev()
            .find(|a| a.provider_request_id.as_deref() == Some("call-1"))
            .unwrap();
        assert_eq!(newest.detail, "second");
    }

    #[test]
    fn geography_key_parses_every_scope() {
        let city: GeographyKey = "city:sn:Dakar".parse().unwrap();
        assert_eq!(
            city,
            GeographyKey::City {
                country: "SN".into(),
                city: "Dakar".into()
            }
        );
        assert_eq!(city.to_string(), "city:SN:Dakar");
        assert_eq!("country:SN".parse::<GeographyKey>().unwrap(), GeographyKey::Country("SN".into()));
        assert_eq!("region:WA".parse::<GeographyKey>().unwrap(), GeographyKey::Region("WA".into()));
        assert_eq!("default".parse::<GeographyKey>().unwrap(), GeographyKey::Default);
        assert!("planet:earth".parse::<GeographyKey>().is_err());
        assert!("city:SN".parse::<GeographyKey>().is_err());
    }

    #[test]
    fn hour_window_wraps_midnight() {
        let night = HourWindow {
            start_hour: 22,
            end_hour: 7,
        };
        assert!(night.contains(23));
        assert!(night.contains(3));
        assert!(!night.contains(12));
        let day = HourWindow {
            start_hour: 8,
            end_hour: 20,
        };
        assert!(day.contains(8));
        assert!(!day.contains(20));
    }

    #[test]
    fn zone_policy_patch_and_validation() {
        let mut zone = ZonePolicy {
            zone_code: "SN".into(),
            channels: ChannelFlags::default(),
            max_backoff_seconds: 300,
            max_retries: 5,
            min_fee: 0.01,
            max_fee: 5.0,
            markup_pct: 10.0,
        };
        zone.apply(&ZonePolicyPatch {
            max_fee: Some(0.001),
            ..ZonePolicyPatch::default()
        });
        assert!(zone.validate().is_err());
        zone.apply(&ZonePolicyPatch {
            max_fee: Some(2.0),
            ..ZonePolicyPatch::default()
        });
        assert!(zone.validate().is_ok());
    }

    #[test]
    fn priority_rank_round_trips_and_orders() {
        for p in [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent] {
            assert_eq!(Priority::from_rank(p.rank()), p);
        }
        assert!(Priority::Low < Priority::Urgent);
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!(Channel::Voice.to_string(), "voice");
    }
}
