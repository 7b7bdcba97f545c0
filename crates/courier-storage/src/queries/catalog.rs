// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zone policy, provider, routing rule and voice rule catalogs.
//!
//! Writes happen only on the administrative path and always append a
//! catalog audit entry in the same transaction.

use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, GeographyKey, HourWindow, Provider, RoutingRule, VoiceRule, ZonePolicy,
    ZonePolicyPatch,
};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{CatalogRows, NewAuditEntry, format_ts, parse_json, parse_text, to_json};
use crate::queries::audit;

fn read_zone(row: &Row<'_>) -> rusqlite::Result<ZonePolicy> {
    let channels: String = row.get(1)?;
    Ok(ZonePolicy {
        zone_code: row.get(0)?,
        channels: parse_json(1, &channels)?,
        max_backoff_seconds: row.get::<_, i64>(2)? as u64,
        max_retries: row.get::<_, i64>(3)? as u32,
        min_fee: row.get(4)?,
        max_fee: row.get(5)?,
        markup_pct: row.get(6)?,
    })
}

fn read_provider(row: &Row<'_>) -> rusqlite::Result<Provider> {
    let channel: String = row.get(2)?;
    let capability: String = row.get(8)?;
    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        channel: parse_text(2, &channel)?,
        zone_code: row.get(3)?,
        priority: row.get(4)?,
        base_cost: row.get(5)?,
        currency: row.get(6)?,
        active: row.get(7)?,
        capability: parse_json(8, &capability)?,
    })
}

fn read_routing_rule(row: &Row<'_>) -> rusqlite::Result<RoutingRule> {
    let primary: String = row.get(2)?;
    let fallback: Option<String> = row.get(3)?;
    Ok(RoutingRule {
        country: row.get(0)?,
        event_type: row.get(1)?,
        primary_channel: parse_text(2, &primary)?,
        fallback_channel: fallback.map(|raw| parse_text(3, &raw)).transpose()?,
    })
}

fn read_voice_rule(row: &Row<'_>) -> rusqlite::Result<VoiceRule> {
    let geography: String = row.get(0)?;
    let start: Option<i64> = row.get(6)?;
    let end: Option<i64> = row.get(7)?;
    let preferred: String = row.get(8)?;
    Ok(VoiceRule {
        geography: parse_text::<GeographyKey>(0, &geography)?,
        fallback_enabled: row.get(1)?,
        fallback_delay_seconds: row.get::<_, i64>(2)? as u64,
        max_message_seconds: row.get::<_, i64>(3)? as u32,
        budget_daily_usd: row.get(4)?,
        budget_monthly_usd: row.get(5)?,
        allowed_hours: start.zip(end).map(|(s, e)| HourWindow {
            start_hour: s as u32,
            end_hour: e as u32,
        }),
        preferred_providers: parse_json(8, &preferred)?,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    read: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], read)?;
    rows.collect()
}

fn write_zone(conn: &Connection, policy: &ZonePolicy, at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO zone_policies
            (zone_code, channels, max_backoff_seconds, max_retries, min_fee, max_fee,
             markup_pct, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (zone_code) DO UPDATE SET
            channels = excluded.channels,
            max_backoff_seconds = excluded.max_backoff_seconds,
            max_retries = excluded.max_retries,
            min_fee = excluded.min_fee,
            max_fee = excluded.max_fee,
            markup_pct = excluded.markup_pct,
            updated_at = excluded.updated_at",
        params![
            policy.zone_code,
            to_json(&policy.channels)?,
            policy.max_backoff_seconds as i64,
            policy.max_retries as i64,
            policy.min_fee,
            policy.max_fee,
            policy.markup_pct,
            at,
        ],
    )?;
    Ok(())
}

/// Read every catalog in one transaction.
pub async fn load_catalog(db: &Database) -> Result<CatalogRows, CourierError> {
    db.connection()
        .call(|conn| -> Result<CatalogRows, rusqlite::Error> {
            let tx = conn.transaction()?;
            let rows = CatalogRows {
                zones: query_all(
                    &tx,
                    "SELECT zone_code, channels, max_backoff_seconds, max_retries, min_fee,
                            max_fee, markup_pct
                     FROM zone_policies ORDER BY zone_code",
                    read_zone,
                )?,
                providers: query_all(
                    &tx,
                    "SELECT id, name, channel, zone_code, priority, base_cost, currency, active,
                            capability
                     FROM providers ORDER BY id",
                    read_provider,
                )?,
                routing_rules: query_all(
                    &tx,
                    "SELECT country, event_type, primary_channel, fallback_channel
                     FROM routing_rules ORDER BY country, event_type",
                    read_routing_rule,
                )?,
                voice_rules: query_all(
                    &tx,
                    "SELECT geography, fallback_enabled, fallback_delay_seconds,
                            max_message_seconds, budget_daily_usd, budget_monthly_usd,
                            allowed_start_hour, allowed_end_hour, preferred_providers
                     FROM voice_rules ORDER BY geography",
                    read_voice_rule,
                )?,
            };
            tx.commit()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_zone_policy(db: &Database, zone_code: &str) -> Result<Option<ZonePolicy>, CourierError> {
    let zone_code = zone_code.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ZonePolicy>, rusqlite::Error> {
            conn.query_row(
                "SELECT zone_code, channels, max_backoff_seconds, max_retries, min_fee, max_fee,
                        markup_pct
                 FROM zone_policies WHERE zone_code = ?1",
                params![zone_code],
                read_zone,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a whole zone policy.
pub async fn upsert_zone_policy(
    db: &Database,
    policy: &ZonePolicy,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    policy.validate()?;
    let policy = policy.clone();
    let actor = actor.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = format_ts(at);
            write_zone(&tx, &policy, &now)?;
            audit::append(
                &tx,
                None,
                &NewAuditEntry::new(
                    &actor,
                    "zone_policy_upserted",
                    serde_json::to_value(&policy).unwrap_or_default(),
                ),
                at,
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a partial update to an existing zone policy and return the result.
///
/// Read, validation and write share one transaction; an invalid result
/// leaves the stored policy unchanged.
pub async fn update_zone_policy(
    db: &Database,
    zone_code: &str,
    patch: &ZonePolicyPatch,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<ZonePolicy, CourierError> {
    let zone_code = zone_code.to_string();
    let patch = patch.clone();
    let actor = actor.to_string();
    db.connection()
        .call(
            move |conn| -> Result<Result<ZonePolicy, CourierError>, rusqlite::Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current = tx
                    .query_row(
                        "SELECT zone_code, channels, max_backoff_seconds, max_retries, min_fee,
                                max_fee, markup_pct
                         FROM zone_policies WHERE zone_code = ?1",
                        params![zone_code],
                        read_zone,
                    )
                    .optional()?;
                let Some(mut policy) = current else {
                    return Ok(Err(CourierError::not_found("zone policy", zone_code)));
                };
                policy.apply(&patch);
                if let Err(e) = policy.validate() {
                    return Ok(Err(e));
                }
                write_zone(&tx, &policy, &format_ts(at))?;
                audit::append(
                    &tx,
                    None,
                    &NewAuditEntry::new(
                        &actor,
                        "zone_policy_updated",
                        serde_json::json!({ "zone_code": policy.zone_code, "patch": patch }),
                    ),
                    at,
                )?;
                tx.commit()?;
                Ok(Ok(policy))
            },
        )
        .await
        .map_err(map_tr_err)?
}

pub async fn upsert_provider(
    db: &Database,
    provider: &Provider,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    if provider.id.trim().is_empty() {
        return Err(CourierError::Validation("provider id must not be empty".into()));
    }
    if provider.base_cost < 0.0 {
        return Err(CourierError::Validation(format!(
            "provider {}: base_cost must be non-negative",
            provider.id
        )));
    }
    let provider = provider.clone();
    let actor = actor.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO providers
                    (id, name, channel, zone_code, priority, base_cost, currency, active,
                     capability, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    channel = excluded.channel,
                    zone_code = excluded.zone_code,
                    priority = excluded.priority,
                    base_cost = excluded.base_cost,
                    currency = excluded.currency,
                    active = excluded.active,
                    capability = excluded.capability,
                    updated_at = excluded.updated_at",
                params![
                    provider.id,
                    provider.name,
                    provider.channel.to_string(),
                    provider.zone_code,
                    provider.priority,
                    provider.base_cost,
                    provider.currency,
                    provider.active,
                    to_json(&provider.capability)?,
                    format_ts(at),
                ],
            )?;
            audit::append(
                &tx,
                None,
                &NewAuditEntry::new(
                    &actor,
                    "provider_upserted",
                    serde_json::to_value(&provider).unwrap_or_default(),
                ),
                at,
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the rule for `(country, event_type)`. Either key may be `*`.
pub async fn upsert_routing_rule(
    db: &Database,
    rule: &RoutingRule,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    if rule.country.trim().is_empty() || rule.event_type.trim().is_empty() {
        return Err(CourierError::Validation(
            "routing rule country and event_type must not be empty".into(),
        ));
    }
    let mut rule = rule.clone();
    rule.country = rule.country.trim().to_uppercase();
    let actor = actor.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO routing_rules
                    (country, event_type, primary_channel, fallback_channel, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (country, event_type) DO UPDATE SET
                    primary_channel = excluded.primary_channel,
                    fallback_channel = excluded.fallback_channel,
                    updated_at = excluded.updated_at",
                params![
                    rule.country,
                    rule.event_type,
                    rule.primary_channel.to_string(),
                    rule.fallback_channel.map(|c| c.to_string()),
                    format_ts(at),
                ],
            )?;
            audit::append(
                &tx,
                None,
                &NewAuditEntry::new(
                    &actor,
                    "routing_rule_upserted",
                    serde_json::to_value(&rule).unwrap_or_default(),
                ),
                at,
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_voice_rule(
    db: &Database,
    rule: &VoiceRule,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    for (name, value) in [
        ("budget_daily_usd", rule.budget_daily_usd),
        ("budget_monthly_usd", rule.budget_monthly_usd),
    ] {
        if value.is_some_and(|v| v < 0.0) {
            return Err(CourierError::Validation(format!(
                "voice rule {}: {name} must be non-negative",
                rule.geography
            )));
        }
    }
    if let Some(window) = rule.allowed_hours
        && (window.start_hour > 23 || window.end_hour > 24)
    {
        return Err(CourierError::Validation(format!(
            "voice rule {}: allowed_hours out of range",
            rule.geography
        )));
    }
    let rule = rule.clone();
    let actor = actor.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO voice_rules
                    (geography, fallback_enabled, fallback_delay_seconds, max_message_seconds,
                     budget_daily_usd, budget_monthly_usd, allowed_start_hour, allowed_end_hour,
                     preferred_providers, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (geography) DO UPDATE SET
                    fallback_enabled = excluded.fallback_enabled,
                    fallback_delay_seconds = excluded.fallback_delay_seconds,
                    max_message_seconds = excluded.max_message_seconds,
                    budget_daily_usd = excluded.budget_daily_usd,
                    budget_monthly_usd = excluded.budget_monthly_usd,
                    allowed_start_hour = excluded.allowed_start_hour,
                    allowed_end_hour = excluded.allowed_end_hour,
                    preferred_providers = excluded.preferred_providers,
                    updated_at = excluded.updated_at",
                params![
                    rule.geography.to_string(),
                    rule.fallback_enabled,
                    rule.fallback_delay_seconds as i64,
                    rule.max_message_seconds as i64,
                    rule.budget_daily_usd,
                    rule.budget_monthly_usd,
                    rule.allowed_hours.map(|w| w.start_hour as i64),
                    rule.allowed_hours.map(|w| w.end_hour as i64),
                    to_json(&rule.preferred_providers)?,
                    format_ts(at),
                ],
            )?;
            audit::append(
                &tx,
                None,
                &NewAuditEntry::new(
                    &actor,
                    "voice_rule_upserted",
                    serde_json::to_value(&rule).unwrap_or_default(),
                ),
                at,
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}
