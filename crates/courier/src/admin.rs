// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status`, `courier requeue` and `courier abort`.
//!
//! These open the configured database directly and print the resulting
//! status view as JSON. No workers are started.

use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{CourierError, DeliveryStatusView, SystemClock};
use courier_engine::{DeliveryEngine, ProviderAdapters};
use courier_storage::Database;
use serde::Serialize;

async fn open_engine(config: &CourierConfig) -> Result<DeliveryEngine, CourierError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    DeliveryEngine::new(db, config, ProviderAdapters::new(), Arc::new(SystemClock)).await
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CourierError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| CourierError::Internal(format!("failed to render JSON: {e}")))?;
    println!("{rendered}");
    Ok(())
}

async fn finish(engine: DeliveryEngine, view: DeliveryStatusView) -> Result<(), CourierError> {
    print_json(&view)?;
    engine.database().close().await
}

pub async fn run_status(config: &CourierConfig, request_id: &str) -> Result<(), CourierError> {
    let engine = open_engine(config).await?;
    let view = engine.get_status(request_id).await?;
    finish(engine, view).await
}

pub async fn run_requeue(
    config: &CourierConfig,
    request_id: &str,
    reason: &str,
    actor: &str,
) -> Result<(), CourierError> {
    let engine = open_engine(config).await?;
    let view = engine.admin_requeue(request_id, reason, actor).await?;
    finish(engine, view).await
}

pub async fn run_abort(
    config: &CourierConfig,
    request_id: &str,
    reason: &str,
    actor: &str,
) -> Result<(), CourierError> {
    let engine = open_engine(config).await?;
    let view = engine.admin_abort(request_id, reason, actor).await?;
    finish(engine, view).await
}
