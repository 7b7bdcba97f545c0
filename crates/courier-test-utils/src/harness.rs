// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles an engine over a temp SQLite file with a manual
//! clock and scripted providers, and seeds the catalogs through the admin
//! path so tests exercise the same code as production.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use courier_config::CourierConfig;
use courier_core::{
    Channel, ChannelFlags, CourierError, DeliveryStatusView, NewDeliveryRequest, Priority, Provider,
    ProviderCapability, VoiceRule, ZonePolicy,
};
use courier_engine::{DeliveryEngine, ProviderAdapters};
use courier_storage::Database;

use crate::clock::ManualClock;
use crate::scripted_provider::ScriptedProvider;

/// Shared secret the harness configures for provider callbacks.
pub const CALLBACK_SECRET: &str = "test-callback-secret-0123456789";

/// Actor recorded for harness-seeded catalog entries.
pub const ADMIN: &str = "test-admin";

/// Zone policy with no markup and wide fee bounds.
pub fn zone_policy(zone_code: &str, max_retries: u32) -> ZonePolicy {
    ZonePolicy {
        zone_code: zone_code.to_string(),
        channels: ChannelFlags::default(),
        max_backoff_seconds: 300,
        max_retries,
        min_fee: 0.0,
        max_fee: 100.0,
        markup_pct: 0.0,
    }
}

/// Active catalog provider entry.
pub fn provider(id: &str, channel: Channel, zone_code: Option<&str>, priority: i32, base_cost: f64) -> Provider {
    Provider {
        id: id.to_string(),
        name: id.to_string(),
        channel,
        zone_code: zone_code.map(str::to_string),
        priority,
        base_cost,
        currency: "USD".to_string(),
        active: true,
        capability: ProviderCapability::default(),
    }
}

/// A valid request for subject `user-1` in `country`/`zone_code`.
pub fn new_request(country: &str, zone_code: &str, channel: Channel) -> NewDeliveryRequest {
    NewDeliveryRequest {
        dedup_key: None,
        subject_ref: "user-1".to_string(),
        event_type: "wallet.p2p.succeeded".to_string(),
        channel: Some(channel),
        country: country.to_string(),
        region: None,
        city: None,
        zone_code: zone_code.to_string(),
        language: "fr".to_string(),
        currency: "XOF".to_string(),
        payload: serde_json::json!({ "body": "Transfer received" }),
        priority: Priority::Normal,
        preferences: Default::default(),
    }
}

/// Builder for test environments.
pub struct TestHarnessBuilder {
    start: DateTime<Utc>,
    config: CourierConfig,
    zones: Vec<ZonePolicy>,
    providers: Vec<(Provider, Arc<ScriptedProvider>)>,
    voice_rules: Vec<VoiceRule>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = CourierConfig::default();
        config.callback.secret = Some(CALLBACK_SECRET.to_string());
        config.worker.max_jitter_ms = 0;
        config.worker.attempt_timeout_ms = 500;
        config.worker.poll_interval_ms = 10;
        Self {
            start: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).single().unwrap_or_else(Utc::now),
            config,
            zones: Vec::new(),
            providers: Vec::new(),
            voice_rules: Vec::new(),
        }
    }

    /// Start the manual clock at `start`.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Adjust the engine configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut CourierConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_zone(mut self, zone: ZonePolicy) -> Self {
        self.zones.push(zone);
        self
    }

    /// Register a catalog entry and the scripted adapter serving it.
    pub fn with_provider(mut self, entry: Provider, adapter: Arc<ScriptedProvider>) -> Self {
        self.providers.push((entry, adapter));
        self
    }

    pub fn with_voice_rule(mut self, rule: VoiceRule) -> Self {
        self.voice_rules.push(rule);
        self
    }

    /// Build the harness, creating the database and seeding the catalogs.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("courier-test.db").to_string_lossy().to_string();
        let db = Database::open(&db_path).await?;

        let mut adapters = ProviderAdapters::new();
        for (_, adapter) in &self.providers {
            adapters.register(Arc::clone(adapter) as Arc<dyn courier_core::DeliveryProvider>);
        }

        let clock = Arc::new(ManualClock::new(self.start));
        let engine = DeliveryEngine::new(db, &self.config, adapters.clone(), clock.clone()).await?;

        for zone in &self.zones {
            engine.admin_upsert_zone_policy(zone, ADMIN).await?;
        }
        for (entry, _) in &self.providers {
            engine.admin_upsert_provider(entry, ADMIN).await?;
        }
        for rule in &self.voice_rules {
            engine.admin_upsert_voice_rule(rule, ADMIN).await?;
        }

        Ok(TestHarness {
            engine,
            clock,
            adapters,
            config: self.config,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A fully wired engine for integration tests.
pub struct TestHarness {
    pub engine: DeliveryEngine,
    pub clock: Arc<ManualClock>,
    adapters: ProviderAdapters,
    config: CourierConfig,
    db_path: String,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub async fn enqueue(&self, request: NewDeliveryRequest) -> Result<String, CourierError> {
        self.engine.enqueue(request, "producer").await
    }

    pub async fn status(&self, request_id: &str) -> Result<DeliveryStatusView, CourierError> {
        self.engine.get_status(request_id).await
    }

    /// Run one claim-and-process pass with a worker named `worker_id`.
    pub async fn run_worker_once(&self, worker_id: &str) -> Result<usize, CourierError> {
        self.engine.worker(worker_id).run_once().await
    }

    /// Drive a request with repeated passes, advancing the clock to its
    /// next attempt time between them, until it is terminal or
    /// `max_passes` is reached.
    pub async fn drive(&self, request_id: &str, max_passes: usize) -> Result<DeliveryStatusView, CourierError> {
        let mut status = self.status(request_id).await?;
        for _ in 0..max_passes {
            if status.status.is_terminal() {
                break;
            }
            if status.next_attempt_at > courier_core::Clock::now(self.clock.as_ref()) {
                self.clock.set(status.next_attempt_at);
            }
            self.run_worker_once("driver").await?;
            status = self.status(request_id).await?;
        }
        Ok(status)
    }

    /// A second, independent engine on the same database file, with its own
    /// connection, as another worker process would have.
    pub async fn second_engine(&self) -> Result<DeliveryEngine, CourierError> {
        let db = Database::open(&self.db_path).await?;
        DeliveryEngine::new(db, &self.config, self.adapters.clone(), self.clock.clone()).await
    }
}
