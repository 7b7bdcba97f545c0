// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned, read-mostly catalog snapshots shared by workers.
//!
//! Workers read an immutable [`CatalogSnapshot`] through an `ArcSwapOption`.
//! A snapshot older than the TTL is reloaded on next use; admin mutations
//! drop it immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use courier_core::{CourierError, ZonePolicy};
use courier_router::{ProviderRegistry, RoutingTable, VoiceRuleTable};
use courier_storage::Database;
use courier_storage::queries::catalog;
use tracing::debug;

/// One consistent read of every catalog.
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub zones: HashMap<String, ZonePolicy>,
    pub providers: ProviderRegistry,
    pub routing: RoutingTable,
    pub voice: VoiceRuleTable,
}

impl CatalogSnapshot {
    pub fn zone(&self, zone_code: &str) -> Option<&ZonePolicy> {
        self.zones.get(zone_code)
    }
}

/// TTL cache over the catalog tables.
pub struct CatalogCache {
    db: Database,
    ttl: Duration,
    current: ArcSwapOption<CatalogSnapshot>,
    versions: AtomicU64,
}

impl CatalogCache {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self {
            db,
            ttl,
            current: ArcSwapOption::empty(),
            versions: AtomicU64::new(0),
        }
    }

    /// Current snapshot, reloading when missing or older than the TTL.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<Arc<CatalogSnapshot>, CourierError> {
        if let Some(snapshot) = self.current.load_full()
            && now - snapshot.loaded_at < self.ttl
        {
            return Ok(snapshot);
        }
        self.reload(now).await
    }

    /// Read the catalogs from storage and publish a new snapshot.
    pub async fn reload(&self, now: DateTime<Utc>) -> Result<Arc<CatalogSnapshot>, CourierError> {
        let rows = catalog::load_catalog(&self.db).await?;
        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(CatalogSnapshot {
            version,
            loaded_at: now,
            zones: rows
                .zones
                .into_iter()
                .map(|z| (z.zone_code.clone(), z))
                .collect(),
            providers: ProviderRegistry::new(rows.providers),
            routing: RoutingTable::new(rows.routing_rules),
            voice: VoiceRuleTable::new(rows.voice_rules),
        });
        debug!(
            version,
            zones = snapshot.zones.len(),
            providers = snapshot.providers.all().len(),
            routing_rules = snapshot.routing.len(),
            voice_rules = snapshot.voice.len(),
            "catalog snapshot loaded"
        );
        self.current.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next read goes to storage.
    pub fn invalidate(&self) {
        self.current.store(None);
    }
}
