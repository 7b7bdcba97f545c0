// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier delivery engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so misspelled keys are
//! rejected at startup with an actionable diagnostic.

use courier_core::{Channel, Priority};
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// System routing defaults.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Inbound provider callback verification.
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Provider adapter bindings, matched to catalog providers by id.
    #[serde(default)]
    pub providers: Vec<ProviderAdapterConfig>,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Instance name, used as the prefix of worker ids.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_engine_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Delivery worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum requests claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Requests processed concurrently inside one batch.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Idle poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Exclusive lease duration on claimed requests.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,

    /// Upper bound on a single provider call.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Catalog snapshot time-to-live (at most 60).
    #[serde(default = "default_catalog_ttl_seconds")]
    pub catalog_ttl_seconds: u64,

    /// Deferral applied when catalogs or policies fail to load.
    #[serde(default = "default_catalog_error_backoff_seconds")]
    pub catalog_error_backoff_seconds: u64,

    /// Upper bound of the random jitter added to retry backoff (at most 5000).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// How long a non-voice asynchronous attempt waits for its callback.
    #[serde(default = "default_callback_wait_seconds")]
    pub default_callback_wait_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            batch_concurrency: default_batch_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_seconds: default_lease_seconds(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            catalog_ttl_seconds: default_catalog_ttl_seconds(),
            catalog_error_backoff_seconds: default_catalog_error_backoff_seconds(),
            max_jitter_ms: default_max_jitter_ms(),
            default_callback_wait_seconds: default_callback_wait_seconds(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    32
}

fn default_batch_concurrency() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lease_seconds() -> u64 {
    120
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_catalog_ttl_seconds() -> u64 {
    30
}

fn default_catalog_error_backoff_seconds() -> u64 {
    15
}

fn default_max_jitter_ms() -> u64 {
    5_000
}

fn default_callback_wait_seconds() -> u64 {
    300
}

/// System routing defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Channel order used when no routing rule matches, after the requested channel.
    #[serde(default = "default_channels")]
    pub default_channels: Vec<Channel>,

    /// Requests at or above this priority ignore quiet hours.
    #[serde(default = "default_urgent_priority")]
    pub urgent_priority: Priority,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_channels: default_channels(),
            urgent_priority: default_urgent_priority(),
        }
    }
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::Push, Channel::Sms, Channel::Email]
}

fn default_urgent_priority() -> Priority {
    Priority::Urgent
}

/// Inbound provider callback verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackConfig {
    /// Shared HMAC-SHA256 secret. `None` rejects every callback.
    #[serde(default)]
    pub secret: Option<String>,

    /// Maximum accepted distance between callback timestamp and now.
    #[serde(default = "default_max_skew_seconds")]
    pub max_skew_seconds: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            secret: None,
            max_skew_seconds: default_max_skew_seconds(),
        }
    }
}

fn default_max_skew_seconds() -> u64 {
    300
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub enabled: bool,
}

/// Kind of adapter bound to a catalog provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// POST the dispatch request as JSON to `url`.
    Webhook,
    /// Log the dispatch and report it delivered (dry run).
    Log,
}

/// Binds an adapter implementation to a catalog provider id.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderAdapterConfig {
    /// Catalog provider id.
    pub id: String,

    pub kind: AdapterKind,

    /// Endpoint for `webhook` adapters.
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token sent to `webhook` endpoints.
    #[serde(default)]
    pub auth_token: Option<String>,
}
