// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metered spend per geography key: committed totals by day and by month,
//! and holds for attempts that have not resolved yet.
//!
//! Every worker process sharing the database sees the same totals. A
//! reservation reads them and writes its hold inside one `BEGIN IMMEDIATE`
//! transaction, so two processes can never both fit under the last slice of
//! a cap.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, GeographyKey};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{BudgetHold, BudgetSpend, HeldTotals, HoldDecision, format_ts, parse_text, parse_ts};

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Add committed spend inside the caller's transaction.
pub(crate) fn add_spend(conn: &Connection, spend: &BudgetSpend) -> rusqlite::Result<()> {
    let geography = spend.geography.to_string();
    for (period, key) in [("day", day_key(spend.at)), ("month", month_key(spend.at))] {
        conn.execute(
            "INSERT INTO budget_spend (geography, period, period_key, spent_usd)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (geography, period, period_key)
             DO UPDATE SET spent_usd = spent_usd + excluded.spent_usd",
            params![geography, period, key, spend.amount],
        )?;
    }
    Ok(())
}

/// Drop the hold of `request_id`, if any, inside the caller's transaction.
pub(crate) fn clear_hold(conn: &Connection, request_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM budget_holds WHERE request_id = ?1", params![request_id])?;
    Ok(())
}

/// Totals for `geography` as of `as_of`. Holds of `except_request` are left
/// out, so re-reserving for the same request replaces rather than stacks.
fn read_totals(
    conn: &Connection,
    geography: &str,
    as_of: DateTime<Utc>,
    except_request: Option<&str>,
) -> rusqlite::Result<HeldTotals> {
    let spent = |period: &str, key: String| -> rusqlite::Result<f64> {
        conn.query_row(
            "SELECT COALESCE(SUM(spent_usd), 0) FROM budget_spend
             WHERE geography = ?1 AND period = ?2 AND period_key = ?3",
            params![geography, period, key],
            |row| row.get(0),
        )
    };
    let reserved: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_usd), 0) FROM budget_holds
         WHERE geography = ?1 AND (?2 IS NULL OR request_id <> ?2)",
        params![geography, except_request],
        |row| row.get(0),
    )?;
    Ok(HeldTotals {
        committed_day: spent("day", day_key(as_of))?,
        committed_month: spent("month", month_key(as_of))?,
        reserved,
    })
}

/// Current totals for `geography`.
pub async fn totals(
    db: &Database,
    geography: &GeographyKey,
    as_of: DateTime<Utc>,
) -> Result<HeldTotals, CourierError> {
    let geography = geography.to_string();
    db.connection()
        .call(move |conn| -> Result<HeldTotals, rusqlite::Error> {
            read_totals(conn, &geography, as_of, None)
        })
        .await
        .map_err(map_tr_err)
}

/// Write `hold` if `check` accepts the totals it would join.
///
/// Totals are read and the hold is written in one immediate transaction. A
/// previous hold of the same request is replaced.
pub async fn reserve<F>(db: &Database, hold: BudgetHold, check: F) -> Result<HoldDecision, CourierError>
where
    F: FnOnce(&HeldTotals) -> Result<(), String> + Send + 'static,
{
    db.connection()
        .call(move |conn| -> Result<HoldDecision, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let geography = hold.geography.to_string();
            let totals = read_totals(&tx, &geography, hold.reserved_at, Some(&hold.request_id))?;
            if let Err(reason) = check(&totals) {
                return Ok(HoldDecision::Rejected(reason));
            }
            tx.execute(
                "INSERT INTO budget_holds (request_id, geography, amount_usd, reserved_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (request_id) DO UPDATE SET
                     geography = excluded.geography,
                     amount_usd = excluded.amount_usd,
                     reserved_at = excluded.reserved_at",
                params![hold.request_id, geography, hold.amount, format_ts(hold.reserved_at)],
            )?;
            tx.commit()?;
            Ok(HoldDecision::Held(totals))
        })
        .await
        .map_err(map_tr_err)
}

/// The hold currently recorded for `request_id`.
pub async fn hold_for(db: &Database, request_id: &str) -> Result<Option<BudgetHold>, CourierError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<BudgetHold>, rusqlite::Error> {
            conn.query_row(
                "SELECT request_id, geography, amount_usd, reserved_at
                 FROM budget_holds WHERE request_id = ?1",
                params![request_id],
                |row| {
                    let geography: String = row.get(1)?;
                    let reserved_at: String = row.get(3)?;
                    Ok(BudgetHold {
                        request_id: row.get(0)?,
                        geography: parse_text(1, &geography)?,
                        amount: row.get(2)?,
                        reserved_at: parse_ts(3, &reserved_at)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::requests;
    use chrono::TimeZone;
    use courier_core::{Channel, NewDeliveryRequest};
    use tempfile::tempdir;

    fn sn() -> GeographyKey {
        GeographyKey::Country("SN".into())
    }

    async fn open() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("b.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, db)
    }

    async fn seed_request(db: &Database, id: &str, at: DateTime<Utc>) {
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
        .into_request(id.into(), at)
        .unwrap();
        requests::insert_request(db, &request, "test").await.unwrap();
    }

    fn hold(request_id: &str, amount: f64, at: DateTime<Utc>) -> BudgetHold {
        BudgetHold {
            request_id: request_id.into(),
            geography: sn(),
            amount,
            reserved_at: at,
        }
    }

    fn cap(limit: f64, amount: f64) -> impl FnOnce(&HeldTotals) -> Result<(), String> + Send + 'static {
        move |t: &HeldTotals| {
            if t.committed_day + t.reserved + amount > limit {
                Err("over cap".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn totals_split_by_day_and_month() {
        let (_dir, db) = open().await;
        let yesterday = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap();
        let today = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2026, 2, 27, 10, 0, 0).unwrap();

        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                for (amount, at) in [(1.0, yesterday), (2.5, today), (0.5, today), (7.0, last_month)] {
                    add_spend(
                        conn,
                        &BudgetSpend {
                            geography: GeographyKey::Country("SN".into()),
                            amount,
                            at,
                        },
                    )?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let totals = totals(&db, &sn(), today).await.unwrap();
        assert!((totals.committed_day - 3.0).abs() < 1e-9);
        assert!((totals.committed_month - 4.0).abs() < 1e-9);
        assert_eq!(totals.reserved, 0.0);
    }

    #[tokio::test]
    async fn holds_from_other_handles_count_against_the_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.db");
        let first = Database::open(path.to_str().unwrap()).await.unwrap();
        let second = Database::open(path.to_str().unwrap()).await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        seed_request(&first, "a", now).await;
        seed_request(&first, "b", now).await;

        let held = reserve(&first, hold("a", 0.8, now), cap(1.0, 0.8)).await.unwrap();
        assert_eq!(held, HoldDecision::Held(HeldTotals::default()));

        let rejected = reserve(&second, hold("b", 0.5, now), cap(1.0, 0.5)).await.unwrap();
        assert_eq!(rejected, HoldDecision::Rejected("over cap".into()));
        assert!(hold_for(&second, "b").await.unwrap().is_none());
        assert_eq!(hold_for(&second, "a").await.unwrap().map(|h| h.amount), Some(0.8));
    }

    #[tokio::test]
    async fn re_reserving_replaces_the_request_hold() {
        let (_dir, db) = open().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        seed_request(&db, "a", now).await;

        reserve(&db, hold("a", 0.9, now), cap(1.0, 0.9)).await.unwrap();
        let again = reserve(&db, hold("a", 0.6, now), cap(1.0, 0.6)).await.unwrap();
        assert!(matches!(again, HoldDecision::Held(_)));
        assert!((totals(&db, &sn(), now).await.unwrap().reserved - 0.6).abs() < 1e-9);

        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { clear_hold(conn, "a") })
            .await
            .unwrap();
        assert_eq!(totals(&db, &sn(), now).await.unwrap().reserved, 0.0);
    }
}
