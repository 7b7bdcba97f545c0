// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation.
//!
//! Checks semantic constraints serde cannot express: bounds on worker
//! tunables, adapter bindings, and callback settings.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AdapterKind, CourierConfig};

/// Catalog snapshots are never served staler than this.
pub const MAX_CATALOG_TTL_SECONDS: u64 = 60;

/// Upper bound on retry jitter.
pub const MAX_JITTER_MS: u64 = 5_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of failing fast.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.engine.name.trim().is_empty() {
        fail("engine.name must not be empty".to_string());
    }
    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        fail(format!(
            "engine.log_level `{}` is not one of {}",
            config.engine.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let worker = &config.worker;
    if worker.workers == 0 {
        fail("worker.workers must be at least 1".to_string());
    }
    if worker.batch_size == 0 {
        fail("worker.batch_size must be at least 1".to_string());
    }
    if worker.batch_concurrency == 0 {
        fail("worker.batch_concurrency must be at least 1".to_string());
    }
    if worker.lease_seconds == 0 {
        fail("worker.lease_seconds must be at least 1".to_string());
    }
    if worker.attempt_timeout_ms == 0 {
        fail("worker.attempt_timeout_ms must be at least 1".to_string());
    }
    if worker.attempt_timeout_ms / 1000 >= worker.lease_seconds {
        fail(format!(
            "worker.attempt_timeout_ms ({}) must be shorter than worker.lease_seconds ({})",
            worker.attempt_timeout_ms, worker.lease_seconds
        ));
    }
    if worker.catalog_ttl_seconds > MAX_CATALOG_TTL_SECONDS {
        fail(format!(
            "worker.catalog_ttl_seconds must be at most {MAX_CATALOG_TTL_SECONDS}, got {}",
            worker.catalog_ttl_seconds
        ));
    }
    if worker.max_jitter_ms > MAX_JITTER_MS {
        fail(format!(
            "worker.max_jitter_ms must be at most {MAX_JITTER_MS}, got {}",
            worker.max_jitter_ms
        ));
    }

    if config.routing.default_channels.is_empty() {
        fail("routing.default_channels must name at least one channel".to_string());
    }

    if let Some(secret) = &config.callback.secret
        && secret.len() < 16
    {
        fail("callback.secret must be at least 16 bytes".to_string());
    }

    let mut seen = HashSet::new();
    for provider in &config.providers {
        if provider.id.trim().is_empty() {
            fail("providers.id must not be empty".to_string());
            continue;
        }
        if !seen.insert(provider.id.as_str()) {
            fail(format!("providers: duplicate adapter id `{}`", provider.id));
        }
        if provider.kind == AdapterKind::Webhook {
            match provider.url.as_deref() {
                None | Some("") => fail(format!(
                    "providers `{}`: webhook adapters require a url",
                    provider.id
                )),
                Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    fail(format!(
                        "providers `{}`: url `{url}` must be http or https",
                        provider.id
                    ))
                }
                Some(_) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
