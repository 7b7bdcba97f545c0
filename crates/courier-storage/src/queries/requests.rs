// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery request persistence: enqueue, lookup, exclusive claiming and
//! atomic state transitions.

use chrono::{DateTime, Duration, Utc};
use courier_core::{
    AttemptLog, AttemptRecord, CourierError, DeliveryRequest, DeliveryStatus, Priority,
};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::debug;

use crate::database::{Database, map_tr_err};
use crate::models::{
    EnqueueOutcome, NewAuditEntry, StoredRequest, Transition, TransitionGuard, format_ts,
    parse_json, parse_text, parse_ts, to_json,
};
use crate::queries::{audit, budget, metrics};

const REQUEST_COLUMNS: &str = "id, dedup_key, subject_ref, event_type, channel, country, region,
     city, zone_code, language, currency, payload, priority, preferences, status, retry_count,
     attempt_floor, next_attempt_at, awaiting_callback, failure_reason, claimed_by, lease_until,
     version, created_at, updated_at";

fn read_request_row(row: &Row<'_>) -> rusqlite::Result<StoredRequest> {
    let channel: String = row.get(4)?;
    let payload: String = row.get(11)?;
    let preferences: String = row.get(13)?;
    let status: String = row.get(14)?;
    let next_attempt_at: String = row.get(17)?;
    let lease_until: Option<String> = row.get(21)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    let request = DeliveryRequest {
        id: row.get(0)?,
        dedup_key: row.get(1)?,
        subject_ref: row.get(2)?,
        event_type: row.get(3)?,
        channel: parse_text(4, &channel)?,
        country: row.get(5)?,
        region: row.get(6)?,
        city: row.get(7)?,
        zone_code: row.get(8)?,
        language: row.get(9)?,
        currency: row.get(10)?,
        payload: parse_json(11, &payload)?,
        priority: Priority::from_rank(row.get(12)?),
        preferences: parse_json(13, &preferences)?,
        status: parse_text(14, &status)?,
        attempts: AttemptLog::new(),
        retry_count: row.get::<_, i64>(15)? as u32,
        attempt_floor: row.get::<_, i64>(16)? as u32,
        next_attempt_at: parse_ts(17, &next_attempt_at)?,
        awaiting_callback: row.get(18)?,
        failure_reason: row.get(19)?,
        created_at: parse_ts(23, &created_at)?,
        updated_at: parse_ts(24, &updated_at)?,
    };

    Ok(StoredRequest {
        request,
        version: row.get(22)?,
        claimed_by: row.get(20)?,
        lease_until: lease_until.map(|raw| parse_ts(21, &raw)).transpose()?,
    })
}

fn load_attempts(conn: &Connection, request_id: &str) -> rusqlite::Result<AttemptLog> {
    let mut stmt = conn.prepare(
        "SELECT provider_id, channel, attempted_at, outcome, latency_ms, cost, detail,
                provider_request_id
         FROM delivery_attempts WHERE request_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![request_id], |row| {
        let channel: String = row.get(1)?;
        let attempted_at: String = row.get(2)?;
        let outcome: String = row.get(3)?;
        Ok(AttemptRecord {
            provider_id: row.get(0)?,
            channel: parse_text(1, &channel)?,
            attempted_at: parse_ts(2, &attempted_at)?,
            outcome: parse_text(3, &outcome)?,
            latency_ms: row.get::<_, i64>(4)? as u64,
            cost: row.get(5)?,
            detail: row.get(6)?,
            provider_request_id: row.get(7)?,
        })
    })?;
    Ok(AttemptLog::from_records(rows.collect::<Result<Vec<_>, _>>()?))
}

fn load_request(conn: &Connection, id: &str) -> rusqlite::Result<Option<StoredRequest>> {
    let stored = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM delivery_requests WHERE id = ?1"),
            params![id],
            read_request_row,
        )
        .optional()?;
    match stored {
        Some(mut stored) => {
            stored.request.attempts = load_attempts(conn, id)?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}

fn insert_attempt(conn: &Connection, request_id: &str, attempt: &AttemptRecord) -> rusqlite::Result<()> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM delivery_attempts WHERE request_id = ?1",
        params![request_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO delivery_attempts
            (request_id, seq, provider_id, channel, attempted_at, outcome, latency_ms, cost,
             detail, provider_request_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            request_id,
            seq,
            attempt.provider_id,
            attempt.channel.to_string(),
            format_ts(attempt.attempted_at),
            attempt.outcome.to_string(),
            attempt.latency_ms as i64,
            attempt.cost,
            attempt.detail,
            attempt.provider_request_id,
        ],
    )?;
    Ok(())
}

/// Persist a new request and its `enqueued` audit entry.
///
/// When the request carries a dedup key that already exists, nothing is
/// written and the existing id is returned.
pub async fn insert_request(
    db: &Database,
    request: &DeliveryRequest,
    actor: &str,
) -> Result<EnqueueOutcome, CourierError> {
    let request = request.clone();
    let actor = actor.to_string();
    db.connection()
        .call(move |conn| -> Result<EnqueueOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(key) = &request.dedup_key {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM delivery_requests WHERE dedup_key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    tx.commit()?;
                    return Ok(EnqueueOutcome { id, created: false });
                }
            }

            let now = format_ts(request.created_at);
            tx.execute(
                "INSERT INTO delivery_requests
                    (id, dedup_key, subject_ref, event_type, channel, country, region, city,
                     zone_code, language, currency, payload, priority, preferences, status,
                     retry_count, attempt_floor, next_attempt_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         0, 0, ?16, ?17, ?17)",
                params![
                    request.id,
                    request.dedup_key,
                    request.subject_ref,
                    request.event_type,
                    request.channel.to_string(),
                    request.country,
                    request.region,
                    request.city,
                    request.zone_code,
                    request.language,
                    request.currency,
                    to_json(&request.payload)?,
                    request.priority.rank(),
                    to_json(&request.preferences)?,
                    request.status.to_string(),
                    format_ts(request.next_attempt_at),
                    now,
                ],
            )?;
            audit::append(
                &tx,
                Some(&request.id),
                &NewAuditEntry::new(
                    &actor,
                    "enqueued",
                    serde_json::json!({
                        "channel": request.channel,
                        "event_type": request.event_type,
                        "priority": request.priority,
                    }),
                ),
                request.created_at,
            )?;
            tx.commit()?;
            Ok(EnqueueOutcome {
                id: request.id,
                created: true,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a request with its full attempt history.
pub async fn get_request(db: &Database, id: &str) -> Result<Option<StoredRequest>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<StoredRequest>, rusqlite::Error> {
            load_request(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// Find the request currently waiting on an asynchronous provider result.
pub async fn find_by_provider_request(
    db: &Database,
    provider_request_id: &str,
) -> Result<Option<StoredRequest>, CourierError> {
    let provider_request_id = provider_request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<StoredRequest>, rusqlite::Error> {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM delivery_requests WHERE awaiting_callback = ?1",
                    params![provider_request_id],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => load_request(conn, &id),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` ready requests for `worker_id`.
///
/// Ready means pending, due, and not under another worker's live lease.
/// Ordered by priority (highest first), then age. Selection and lease
/// assignment happen in one `BEGIN IMMEDIATE` transaction, so two handles
/// racing on the same file can never claim the same row.
pub async fn claim_batch(
    db: &Database,
    worker_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
    limit: usize,
) -> Result<Vec<StoredRequest>, CourierError> {
    let worker_id = worker_id.to_string();
    let now_s = format_ts(now);
    let lease_until = format_ts(now + lease);
    db.connection()
        .call(move |conn| -> Result<Vec<StoredRequest>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM delivery_requests
                     WHERE status = 'pending'
                       AND next_attempt_at <= ?1
                       AND (claimed_by IS NULL OR lease_until <= ?1)
                     ORDER BY priority DESC, created_at ASC, id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![now_s, limit as i64], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };

            let mut claimed = Vec::with_capacity(ids.len());
            for id in &ids {
                tx.execute(
                    "UPDATE delivery_requests
                     SET claimed_by = ?1, lease_until = ?2, version = version + 1
                     WHERE id = ?3",
                    params![worker_id, lease_until, id],
                )?;
                if let Some(stored) = load_request(&tx, id)? {
                    claimed.push(stored);
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
        .inspect(|claimed| {
            if !claimed.is_empty() {
                debug!(count = claimed.len(), "claimed batch");
            }
        })
}

/// Extend `worker_id`'s lease on `request_id` to `now + lease`.
///
/// Succeeds only while that worker still holds an unexpired lease. Workers
/// call this before every provider attempt; `false` means the request may
/// already belong to someone else and must be left alone.
pub async fn renew_lease(
    db: &Database,
    request_id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<bool, CourierError> {
    let request_id = request_id.to_string();
    let worker_id = worker_id.to_string();
    let now_s = format_ts(now);
    let lease_until = format_ts(now + lease);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let renewed = conn.execute(
                "UPDATE delivery_requests
                 SET lease_until = ?3, version = version + 1
                 WHERE id = ?1 AND claimed_by = ?2 AND lease_until > ?4",
                params![request_id, worker_id, lease_until, now_s],
            )?;
            Ok(renewed == 1)
        })
        .await
        .map_err(map_tr_err)
}

enum Verdict {
    Applied,
    Missing,
    LeaseLost,
    Conflict { status: String },
}

/// Apply a transition: guard check, attempt append, audit entries, metrics
/// aggregate, committed spend and the new request state, all or nothing.
pub async fn commit_transition(db: &Database, transition: Transition) -> Result<(), CourierError> {
    let request_id = transition.request_id.clone();
    let action = transition.action.clone();
    let verdict = db
        .connection()
        .call(move |conn| -> Result<Verdict, rusqlite::Error> {
            let t = transition;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = format_ts(t.at);

            let current: Option<(String, Option<String>, Option<String>, i64)> = tx
                .query_row(
                    "SELECT status, claimed_by, lease_until, version
                     FROM delivery_requests WHERE id = ?1",
                    params![t.request_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((status, claimed_by, lease_until, version)) = current else {
                return Ok(Verdict::Missing);
            };

            match &t.guard {
                TransitionGuard::Lease { worker_id } => {
                    if claimed_by.as_deref() != Some(worker_id.as_str()) {
                        return Ok(Verdict::LeaseLost);
                    }
                }
                TransitionGuard::Version { version: expected } => {
                    let lease_live = claimed_by.is_some()
                        && lease_until.as_deref().is_some_and(|until| until > now.as_str());
                    if *expected != version || lease_live {
                        return Ok(Verdict::Conflict { status });
                    }
                }
            }

            if let Some(attempt) = &t.attempt {
                insert_attempt(&tx, &t.request_id, attempt)?;
            }
            for entry in &t.audit {
                audit::append(&tx, Some(&t.request_id), entry, t.at)?;
            }
            if let Some(sample) = &t.metrics {
                metrics::record_sample(&tx, sample)?;
            }
            if let Some(spend) = &t.spend {
                budget::add_spend(&tx, spend)?;
            }
            if t.state.awaiting_callback.is_none() {
                budget::clear_hold(&tx, &t.request_id)?;
            }

            let s = &t.state;
            tx.execute(
                "UPDATE delivery_requests
                 SET status = ?1, retry_count = ?2, attempt_floor = ?3, next_attempt_at = ?4,
                     awaiting_callback = ?5, failure_reason = ?6, updated_at = ?7,
                     version = version + 1,
                     claimed_by = CASE WHEN ?8 THEN NULL ELSE claimed_by END,
                     lease_until = CASE WHEN ?8 THEN NULL ELSE lease_until END
                 WHERE id = ?9",
                params![
                    s.status.to_string(),
                    s.retry_count as i64,
                    s.attempt_floor as i64,
                    format_ts(s.next_attempt_at),
                    s.awaiting_callback,
                    s.failure_reason,
                    now,
                    t.release_lease,
                    t.request_id,
                ],
            )?;
            tx.commit()?;
            Ok(Verdict::Applied)
        })
        .await
        .map_err(map_tr_err)?;

    match verdict {
        Verdict::Applied => Ok(()),
        Verdict::Missing => Err(CourierError::not_found("request", request_id)),
        Verdict::LeaseLost => Err(CourierError::LeaseLost { request_id }),
        Verdict::Conflict { status } => Err(CourierError::InvalidTransition {
            request_id,
            status,
            action,
        }),
    }
}

/// Release a lease without changing the request state. A budget hold left by
/// an interrupted attempt goes with it.
pub async fn release_lease(db: &Database, request_id: &str, worker_id: &str) -> Result<(), CourierError> {
    let request_id = request_id.to_string();
    let worker_id = worker_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let released = tx.execute(
                "UPDATE delivery_requests
                 SET claimed_by = NULL, lease_until = NULL, version = version + 1
                 WHERE id = ?1 AND claimed_by = ?2",
                params![request_id, worker_id],
            )?;
            if released > 0 {
                tx.execute(
                    "DELETE FROM budget_holds WHERE request_id = ?1
                     AND EXISTS (SELECT 1 FROM delivery_requests
                                 WHERE id = ?1 AND awaiting_callback IS NULL)",
                    params![request_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of requests per status, for the CLI summary.
pub async fn count_by_status(db: &Database) -> Result<Vec<(DeliveryStatus, u64)>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<(DeliveryStatus, u64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM delivery_requests GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(0)?;
                Ok((parse_text(0, &status)?, row.get::<_, i64>(1)? as u64))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
