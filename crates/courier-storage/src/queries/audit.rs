// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail.

use chrono::{DateTime, Utc};
use courier_core::{AuditEntry, CourierError};
use rusqlite::{Connection, Row, params};

use crate::database::{Database, map_tr_err};
use crate::models::{NewAuditEntry, format_ts, parse_json, parse_ts, to_json};

/// Append an entry inside the caller's transaction.
pub(crate) fn append(
    conn: &Connection,
    request_id: Option<&str>,
    entry: &NewAuditEntry,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_log (request_id, actor, action, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            request_id,
            entry.actor,
            entry.action,
            to_json(&entry.details)?,
            format_ts(at),
        ],
    )?;
    Ok(())
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let details: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        request_id: row.get(1)?,
        actor: row.get(2)?,
        action: row.get(3)?,
        details: parse_json(4, &details)?,
        created_at: parse_ts(5, &created_at)?,
    })
}

/// Entries for one request, oldest first.
pub async fn list_for_request(db: &Database, request_id: &str) -> Result<Vec<AuditEntry>, CourierError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<AuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, request_id, actor, action, details, created_at
                 FROM audit_log WHERE request_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![request_id], read_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Catalog change entries (no request), newest first.
pub async fn list_catalog_changes(db: &Database, limit: usize) -> Result<Vec<AuditEntry>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<AuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, request_id, actor, action, details, created_at
                 FROM audit_log WHERE request_id IS NULL ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], read_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
