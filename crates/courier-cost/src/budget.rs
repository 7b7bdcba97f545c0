// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-geography spend caps for metered channels.
//!
//! Spend lives in storage, not in the process: committed totals per day and
//! month, and one hold per request whose metered attempt has not resolved.
//! [`BudgetGuard::reserve`] checks the caps against committed + held spend
//! and writes the hold in the same transaction, so workers in different
//! processes cannot jointly overspend.
//!
//! A hold is settled by the request's next persisted transition: committed
//! as spend when it delivers, dropped otherwise, kept only while the request
//! awaits a provider callback.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, GeographyKey, VoiceRule};
use courier_storage::models::{BudgetHold, HeldTotals, HoldDecision};
use courier_storage::{Database, queries::budget};
use tracing::{debug, warn};

/// Tolerance for float accumulation when comparing against a cap.
const EPSILON: f64 = 1e-9;

/// Outcome of a read-only budget check.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Would `proposed` fit under `rule`'s caps given `totals`?
pub fn check_caps(
    rule: &VoiceRule,
    key: &GeographyKey,
    totals: &HeldTotals,
    proposed: f64,
) -> Result<(), String> {
    let reserved = totals.reserved;
    for (period, committed, cap) in [
        ("daily", totals.committed_day, rule.budget_daily_usd),
        ("monthly", totals.committed_month, rule.budget_monthly_usd),
    ] {
        let Some(cap) = cap else { continue };
        let projected = committed + reserved + proposed;
        if projected > cap + EPSILON {
            return Err(format!(
                "{period} budget of ${cap:.2} for {key} would be exceeded \
                 (committed ${committed:.6}, reserved ${reserved:.6}, proposed ${proposed:.6})"
            ));
        }
        if projected >= cap * 0.8 {
            warn!(
                geography = %key,
                period,
                projected,
                cap,
                "approaching metered budget cap (80%+)"
            );
        }
    }
    Ok(())
}

/// Reserve-then-commit budget enforcement over the shared database.
#[derive(Clone)]
pub struct BudgetGuard {
    db: Database,
}

impl BudgetGuard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Would `proposed_cost` fit under the rule's caps right now?
    pub async fn check_budget(
        &self,
        rule: &VoiceRule,
        key: &GeographyKey,
        proposed_cost: f64,
        as_of: DateTime<Utc>,
    ) -> Result<BudgetCheck, CourierError> {
        let totals = budget::totals(&self.db, key, as_of).await?;
        Ok(match check_caps(rule, key, &totals, proposed_cost) {
            Ok(()) => BudgetCheck {
                allowed: true,
                reason: None,
            },
            Err(reason) => BudgetCheck {
                allowed: false,
                reason: Some(reason),
            },
        })
    }

    /// Atomically check and hold `proposed_cost` for `request_id`.
    ///
    /// Any earlier hold of the same request is replaced, not added to.
    pub async fn reserve(
        &self,
        rule: &VoiceRule,
        key: &GeographyKey,
        request_id: &str,
        proposed_cost: f64,
        as_of: DateTime<Utc>,
    ) -> Result<Reservation, CourierError> {
        let hold = BudgetHold {
            request_id: request_id.to_string(),
            geography: key.clone(),
            amount: proposed_cost,
            reserved_at: as_of,
        };
        let (rule_for_check, key_for_check) = (rule.clone(), key.clone());
        let decision = budget::reserve(&self.db, hold, move |totals| {
            check_caps(&rule_for_check, &key_for_check, totals, proposed_cost)
        })
        .await?;

        match decision {
            HoldDecision::Held(totals) => {
                debug!(
                    geography = %key,
                    request_id,
                    amount = proposed_cost,
                    committed_day = totals.committed_day,
                    reserved = totals.reserved,
                    "budget reserved"
                );
                Ok(Reservation {
                    request_id: request_id.to_string(),
                    geography: key.clone(),
                    amount: proposed_cost,
                })
            }
            HoldDecision::Rejected(message) => Err(CourierError::BudgetExceeded { message }),
        }
    }

    /// The hold recorded for `request_id`, if its attempt is unresolved.
    pub async fn held(&self, request_id: &str) -> Result<Option<Reservation>, CourierError> {
        Ok(budget::hold_for(&self.db, request_id).await?.map(|hold| Reservation {
            request_id: hold.request_id,
            geography: hold.geography,
            amount: hold.amount,
        }))
    }

    /// Committed spend for `key` in the day and month of `as_of`.
    pub async fn committed(&self, key: &GeographyKey, as_of: DateTime<Utc>) -> Result<(f64, f64), CourierError> {
        let totals = budget::totals(&self.db, key, as_of).await?;
        Ok((totals.committed_day, totals.committed_month))
    }

    /// Sum of outstanding holds for `key`.
    pub async fn reserved(&self, key: &GeographyKey, as_of: DateTime<Utc>) -> Result<f64, CourierError> {
        Ok(budget::totals(&self.db, key, as_of).await?.reserved)
    }
}

/// Budget held for one request's metered attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    request_id: String,
    geography: GeographyKey,
    amount: f64,
}

impl Reservation {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn geography(&self) -> &GeographyKey {
        &self.geography
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::{Channel, NewDeliveryRequest};
    use courier_storage::queries::requests;

    fn rule(daily: Option<f64>, monthly: Option<f64>) -> VoiceRule {
        VoiceRule {
            geography: GeographyKey::Country("SN".into()),
            budget_daily_usd: daily,
            budget_monthly_usd: monthly,
            ..VoiceRule::default()
        }
    }

    fn key() -> GeographyKey {
        GeographyKey::Country("SN".into())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn totals(day: f64, month: f64, reserved: f64) -> HeldTotals {
        HeldTotals {
            committed_day: day,
            committed_month: month,
            reserved,
        }
    }

    async fn guard_with_requests(ids: &[&str]) -> (tempfile::TempDir, BudgetGuard) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("b.db").to_str().unwrap())
            .await
            .unwrap();
        for id in ids {
            let request = NewDeliveryRequest {
                subject_ref: "user-1".into(),
                event_type: "otp".into(),
                channel: Some(Channel::Voice),
                country: "SN".into(),
                zone_code: "WA".into(),
                language: "fr".into(),
                currency: "XOF".into(),
                payload: serde_json::json!({}),
                ..NewDeliveryRequest::default()
            }
            .into_request((*id).to_string(), now())
            .unwrap();
            requests::insert_request(&db, &request, "test").await.unwrap();
        }
        (dir, BudgetGuard::new(db))
    }

    #[test]
    fn exact_cap_is_allowed() {
        assert!(check_caps(&rule(Some(1.0), None), &key(), &totals(0.4, 0.4, 0.0), 0.6).is_ok());
    }

    #[test]
    fn holds_count_against_the_cap() {
        let err = check_caps(&rule(Some(1.0), None), &key(), &totals(0.0, 0.0, 0.7), 0.5).unwrap_err();
        assert!(err.contains("daily"));
        assert!(err.contains("reserved $0.700000"));
    }

    #[test]
    fn monthly_cap_applies_across_days() {
        let err = check_caps(&rule(Some(5.0), Some(6.0)), &key(), &totals(0.0, 4.0, 0.0), 3.0).unwrap_err();
        assert!(err.contains("monthly"));
    }

    #[test]
    fn uncapped_rules_always_pass() {
        assert!(check_caps(&rule(None, None), &key(), &totals(1e6, 1e6, 1e6), 1e6).is_ok());
    }

    #[tokio::test]
    async fn reservation_blocks_until_the_hold_is_replaced() {
        let (_dir, guard) = guard_with_requests(&["a", "b"]).await;
        let r = rule(Some(1.0), None);

        let held = guard.reserve(&r, &key(), "a", 0.7, now()).await.unwrap();
        assert_eq!(held.amount(), 0.7);
        assert!(!guard.check_budget(&r, &key(), 0.5, now()).await.unwrap().allowed);
        assert!(matches!(
            guard.reserve(&r, &key(), "b", 0.5, now()).await,
            Err(CourierError::BudgetExceeded { .. })
        ));

        // Re-reserving for the same request replaces its hold.
        guard.reserve(&r, &key(), "a", 0.3, now()).await.unwrap();
        assert!((guard.reserved(&key(), now()).await.unwrap() - 0.3).abs() < 1e-9);
        guard.reserve(&r, &key(), "b", 0.5, now()).await.unwrap();
        assert_eq!(guard.held("b").await.unwrap().map(|h| h.amount()), Some(0.5));
        assert!(guard.held("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (_dir, guard) = guard_with_requests(&["a", "b"]).await;
        let capped = rule(Some(1.0), None);
        guard.reserve(&capped, &key(), "a", 1.0, now()).await.unwrap();
        let dakar = GeographyKey::City {
            country: "SN".into(),
            city: "Dakar".into(),
        };
        assert!(guard.check_budget(&capped, &dakar, 1.0, now()).await.unwrap().allowed);
        assert_eq!(guard.committed(&key(), now()).await.unwrap(), (0.0, 0.0));
    }
}
