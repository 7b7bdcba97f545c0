// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily delivery aggregates keyed by (day, zone, channel).

use chrono::NaiveDate;
use courier_core::{Channel, CourierError, MetricsAggregate};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::database::{Database, map_tr_err};
use crate::models::{MetricsSample, parse_text};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Fold one sample into its aggregate row inside the caller's transaction.
///
/// Averages are running means over every sample folded into the row.
pub(crate) fn record_sample(conn: &Connection, sample: &MetricsSample) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO metrics_daily
            (day, zone_code, channel, sent, delivered, failed, samples, avg_latency_ms, avg_cost)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)
         ON CONFLICT (day, zone_code, channel) DO UPDATE SET
            sent = sent + excluded.sent,
            delivered = delivered + excluded.delivered,
            failed = failed + excluded.failed,
            avg_latency_ms = (avg_latency_ms * samples + excluded.avg_latency_ms) / (samples + 1),
            avg_cost = (avg_cost * samples + excluded.avg_cost) / (samples + 1),
            samples = samples + 1",
        params![
            sample.day.format(DAY_FORMAT).to_string(),
            sample.zone_code,
            sample.channel.to_string(),
            sample.sent as i64,
            sample.delivered as i64,
            sample.failed as i64,
            sample.latency_ms as f64,
            sample.cost,
        ],
    )?;
    Ok(())
}

fn read_aggregate(row: &Row<'_>) -> rusqlite::Result<MetricsAggregate> {
    let day: String = row.get(0)?;
    let channel: String = row.get(2)?;
    Ok(MetricsAggregate {
        day: parse_text(0, &day)?,
        zone_code: row.get(1)?,
        channel: parse_text(2, &channel)?,
        sent: row.get::<_, i64>(3)? as u64,
        delivered: row.get::<_, i64>(4)? as u64,
        failed: row.get::<_, i64>(5)? as u64,
        avg_latency_ms: row.get(6)?,
        avg_cost: row.get(7)?,
    })
}

pub async fn get_aggregate(
    db: &Database,
    day: NaiveDate,
    zone_code: &str,
    channel: Channel,
) -> Result<Option<MetricsAggregate>, CourierError> {
    let day = day.format(DAY_FORMAT).to_string();
    let zone_code = zone_code.to_string();
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MetricsAggregate>, rusqlite::Error> {
            conn.query_row(
                "SELECT day, zone_code, channel, sent, delivered, failed, avg_latency_ms, avg_cost
                 FROM metrics_daily WHERE day = ?1 AND zone_code = ?2 AND channel = ?3",
                params![day, zone_code, channel],
                read_aggregate,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Every aggregate for one day.
pub async fn list_for_day(db: &Database, day: NaiveDate) -> Result<Vec<MetricsAggregate>, CourierError> {
    let day = day.format(DAY_FORMAT).to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<MetricsAggregate>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT day, zone_code, channel, sent, delivered, failed, avg_latency_ms, avg_cost
                 FROM metrics_daily WHERE day = ?1 ORDER BY zone_code, channel",
            )?;
            let rows = stmt.query_map(params![day], read_aggregate)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(delivered: bool, latency_ms: u64, cost: f64) -> MetricsSample {
        MetricsSample {
            day: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            zone_code: "WA".into(),
            channel: Channel::Voice,
            sent: true,
            delivered,
            failed: !delivered,
            latency_ms,
            cost,
        }
    }

    #[tokio::test]
    async fn running_averages_fold_every_sample() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                record_sample(conn, &sample(false, 100, 0.0))?;
                record_sample(conn, &sample(true, 300, 1.5))?;
                Ok(())
            })
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let agg = get_aggregate(&db, day, "WA", Channel::Voice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((agg.sent, agg.delivered, agg.failed), (2, 1, 1));
        assert!((agg.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((agg.avg_cost - 0.75).abs() < 1e-9);
        assert_eq!(list_for_day(&db, day).await.unwrap().len(), 1);
        assert!(get_aggregate(&db, day, "WA", Channel::Sms).await.unwrap().is_none());
    }
}
