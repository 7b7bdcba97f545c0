// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens storage, binds the configured provider adapters, starts the worker
//! pool and blocks until a shutdown signal, then drains the workers.

use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{CourierError, SystemClock};
use courier_engine::{DeliveryEngine, drain_workers, install_signal_handler};
use courier_storage::Database;
use tracing::{info, warn};

use crate::providers::build_adapters;

/// Upper bound on how long shutdown waits for in-flight batches.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `courier serve` command.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.engine.log_level);

    #[cfg(feature = "prometheus")]
    let prometheus = if config.prometheus.enabled {
        Some(courier_prometheus::PrometheusAdapter::new()?)
    } else {
        None
    };

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = config.storage.database_path.as_str(), "storage opened");

    let adapters = build_adapters(&config)?;
    if adapters.is_empty() {
        warn!("no provider adapters configured, every attempt will skip its provider");
    }

    let engine = DeliveryEngine::new(db, &config, adapters, Arc::new(SystemClock)).await?;

    let cancel = install_signal_handler();
    let handles = engine.spawn_workers(config.worker.workers, &cancel);
    info!(
        name = config.engine.name.as_str(),
        workers = handles.len(),
        batch_size = config.worker.batch_size,
        "courier serving"
    );

    cancel.cancelled().await;
    drain_workers(handles, DRAIN_TIMEOUT).await;

    #[cfg(feature = "prometheus")]
    if let Some(prometheus) = prometheus {
        tracing::debug!(metrics = %prometheus.render(), "final metrics snapshot");
    }

    engine.database().close().await?;
    info!("courier stopped");
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
