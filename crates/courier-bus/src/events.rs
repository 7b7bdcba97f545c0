// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal delivery events.

use chrono::{DateTime, Utc};
use courier_core::{AttemptRecord, DeliveryRequest, DeliveryStatus};
use serde::{Deserialize, Serialize};
use strum::Display;

/// What happened to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEventKind {
    Delivered,
    Failed,
    Aborted,
}

/// A terminal result with the full attempt chain, for downstream consumers
/// and operator triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_id: String,
    pub kind: DeliveryEventKind,
    pub request_id: String,
    pub subject_ref: String,
    pub event_type: String,
    pub zone_code: String,
    pub status: DeliveryStatus,
    pub failure_reason: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub occurred_at: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Build the event for a request that has reached a terminal status.
    /// Returns `None` while the request is still pending.
    pub fn terminal(request: &DeliveryRequest, at: DateTime<Utc>) -> Option<Self> {
        let kind = match request.status {
            DeliveryStatus::Pending => return None,
            DeliveryStatus::Delivered => DeliveryEventKind::Delivered,
            DeliveryStatus::Failed => DeliveryEventKind::Failed,
            DeliveryStatus::Aborted => DeliveryEventKind::Aborted,
        };
        Some(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            request_id: request.id.clone(),
            subject_ref: request.subject_ref.clone(),
            event_type: request.event_type.clone(),
            zone_code: request.zone_code.clone(),
            status: request.status,
            failure_reason: request.failure_reason.clone(),
            attempts: request.attempts.as_slice().to_vec(),
            occurred_at: at,
        })
    }

    /// JSON form handed to external brokers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Channel, NewDeliveryRequest};

    fn request() -> DeliveryRequest {
        NewDeliveryRequest {
            subject_ref: "user-1".into(),
            event_type: "otp".into(),
            channel: Some(Channel::Sms),
            country: "SN".into(),
            zone_code: "WA".into(),
            language: "fr".into(),
            currency: "XOF".into(),
            payload: serde_json::json!({"code": "1234"}),
            ..NewDeliveryRequest::default()
        }
        .into_request("r-1".into(), Utc::now())
        .unwrap()
    }

    #[test]
    fn pending_requests_have_no_event() {
        assert!(DeliveryEvent::terminal(&request(), Utc::now()).is_none());
    }

    #[test]
    fn failed_request_carries_reason() {
        let mut req = request();
        req.status = DeliveryStatus::Failed;
        req.failure_reason = Some("max_retries_exhausted".into());
        let event = DeliveryEvent::terminal(&req, Utc::now()).unwrap();
        assert_eq!(event.kind, DeliveryEventKind::Failed);
        assert_eq!(event.to_json()["kind"], "failed");
        assert_eq!(event.to_json()["failure_reason"], "max_retries_exhausted");
    }
}
