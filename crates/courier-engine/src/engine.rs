// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade: enqueue, status, admin operations and provider
//! callbacks. Workers are created from it and share its state.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_bus::EventBus;
use courier_config::CourierConfig;
use courier_core::{
    AttemptOutcome, AttemptRecord, AuditEntry, Channel, Clock, CourierError, DeliveryStatus,
    DeliveryStatusView, NewDeliveryRequest, Provider, RoutingRule, VoiceRule, ZonePolicy,
    ZonePolicyPatch,
};
use courier_cost::{BudgetGuard, round6};
use courier_router::RoutingResolver;
use courier_storage::queries::{audit, catalog, requests};
use courier_storage::{BudgetSpend, Database, NewAuditEntry, TransitionGuard};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::ProviderAdapters;
use crate::callback::{CallbackPayload, CallbackVerifier};
use crate::catalog::CatalogCache;
use crate::context::{EngineContext, Step};
use crate::worker::{DeliveryWorker, WorkerSettings};

/// Notification delivery engine.
pub struct DeliveryEngine {
    ctx: Arc<EngineContext>,
    verifier: Option<CallbackVerifier>,
    name: String,
}

impl DeliveryEngine {
    /// Build an engine over `db`. Budget state is read from the database on
    /// every reservation, so engines sharing a file share their caps.
    pub async fn new(
        db: Database,
        config: &CourierConfig,
        adapters: ProviderAdapters,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CourierError> {
        let budget = BudgetGuard::new(db.clone());
        let verifier = config.callback.secret.as_ref().map(|secret| {
            CallbackVerifier::new(
                secret.as_bytes().to_vec(),
                Duration::seconds(config.callback.max_skew_seconds as i64),
            )
        });
        if verifier.is_none() {
            warn!("no callback secret configured, provider callbacks will be rejected");
        }

        let ctx = EngineContext {
            catalog: CatalogCache::new(
                db.clone(),
                Duration::seconds(config.worker.catalog_ttl_seconds as i64),
            ),
            db,
            clock,
            budget,
            adapters,
            bus: EventBus::default(),
            resolver: RoutingResolver::new(
                config.routing.default_channels.clone(),
                config.routing.urgent_priority,
            ),
            settings: WorkerSettings::from_config(&config.worker),
        };
        Ok(Self {
            ctx: Arc::new(ctx),
            verifier,
            name: config.engine.name.clone(),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.ctx.budget
    }

    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    pub fn worker(&self, worker_id: impl Into<String>) -> DeliveryWorker {
        DeliveryWorker::new(Arc::clone(&self.ctx), worker_id.into())
    }

    /// Spawn `count` polling workers that stop when `cancel` fires.
    pub fn spawn_workers(&self, count: usize, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let instance = uuid::Uuid::new_v4().simple().to_string();
        let instance = &instance[..8];
        (0..count)
            .map(|i| {
                let worker = self.worker(format!("{}-{instance}-{i}", self.name));
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            })
            .collect()
    }

    /// Validate and persist a new request. Returns its id.
    ///
    /// With a dedup key that was already used, the original id is returned
    /// and nothing new is stored.
    pub async fn enqueue(&self, new: NewDeliveryRequest, actor: &str) -> Result<String, CourierError> {
        let now = self.ctx.clock.now();
        let request = new.into_request(uuid::Uuid::new_v4().to_string(), now)?;
        let outcome = requests::insert_request(&self.ctx.db, &request, actor).await?;
        if outcome.created {
            info!(
                request_id = outcome.id.as_str(),
                channel = %request.channel,
                zone_code = request.zone_code.as_str(),
                priority = %request.priority,
                "request enqueued"
            );
        } else {
            info!(
                request_id = outcome.id.as_str(),
                dedup_key = request.dedup_key.as_deref().unwrap_or(""),
                "duplicate enqueue, returning existing request"
            );
        }
        Ok(outcome.id)
    }

    pub async fn get_status(&self, request_id: &str) -> Result<DeliveryStatusView, CourierError> {
        let stored = requests::get_request(&self.ctx.db, request_id)
            .await?
            .ok_or_else(|| CourierError::not_found("request", request_id))?;
        Ok(DeliveryStatusView::from(&stored.request))
    }

    pub async fn audit_trail(&self, request_id: &str) -> Result<Vec<AuditEntry>, CourierError> {
        audit::list_for_request(&self.ctx.db, request_id).await
    }

    // --- catalog administration ---

    pub async fn admin_upsert_zone_policy(&self, policy: &ZonePolicy, actor: &str) -> Result<(), CourierError> {
        catalog::upsert_zone_policy(&self.ctx.db, policy, actor, self.ctx.clock.now()).await?;
        self.ctx.catalog.invalidate();
        Ok(())
    }

    pub async fn admin_update_zone_policy(
        &self,
        zone_code: &str,
        patch: &ZonePolicyPatch,
        actor: &str,
    ) -> Result<ZonePolicy, CourierError> {
        let updated =
            catalog::update_zone_policy(&self.ctx.db, zone_code, patch, actor, self.ctx.clock.now()).await?;
        self.ctx.catalog.invalidate();
        info!(zone_code, actor, "zone policy updated");
        Ok(updated)
    }

    pub async fn admin_upsert_provider(&self, provider: &Provider, actor: &str) -> Result<(), CourierError> {
        catalog::upsert_provider(&self.ctx.db, provider, actor, self.ctx.clock.now()).await?;
        self.ctx.catalog.invalidate();
        Ok(())
    }

    pub async fn admin_upsert_routing_rule(
        &self,
        country: &str,
        event_type: &str,
        primary_channel: Channel,
        fallback_channel: Option<Channel>,
        actor: &str,
    ) -> Result<(), CourierError> {
        let rule = RoutingRule {
            country: country.to_string(),
            event_type: event_type.to_string(),
            primary_channel,
            fallback_channel,
        };
        catalog::upsert_routing_rule(&self.ctx.db, &rule, actor, self.ctx.clock.now()).await?;
        self.ctx.catalog.invalidate();
        info!(country, event_type, primary = %primary_channel, actor, "routing rule upserted");
        Ok(())
    }

    pub async fn admin_upsert_voice_rule(&self, rule: &VoiceRule, actor: &str) -> Result<(), CourierError> {
        catalog::upsert_voice_rule(&self.ctx.db, rule, actor, self.ctx.clock.now()).await?;
        self.ctx.catalog.invalidate();
        info!(geography = %rule.geography, actor, "voice rule upserted");
        Ok(())
    }

    /// Recent catalog mutations, newest first.
    pub async fn catalog_changes(&self, limit: usize) -> Result<Vec<AuditEntry>, CourierError> {
        audit::list_catalog_changes(&self.ctx.db, limit).await
    }

    // --- request administration ---

    /// Make a request immediately claimable again. Attempt history is kept;
    /// the retry budget restarts from the current attempt count.
    pub async fn admin_requeue(
        &self,
        request_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<DeliveryStatusView, CourierError> {
        let now = self.ctx.clock.now();
        let stored = requests::get_request(&self.ctx.db, request_id)
            .await?
            .ok_or_else(|| CourierError::not_found("request", request_id))?;
        let lease_active = stored.lease_active(now);
        let version = stored.version;
        let mut request = stored.request;
        if request.status == DeliveryStatus::Delivered || lease_active {
            return Err(invalid_transition(&request.id, request.status, lease_active, "requeue"));
        }

        request.awaiting_callback = None;
        let previous = request.status;
        request.status = DeliveryStatus::Pending;
        request.retry_count = 0;
        request.attempt_floor = request.attempts.len() as u32;
        request.next_attempt_at = now;
        request.failure_reason = None;

        self.ctx
            .apply(
                &mut request,
                TransitionGuard::Version { version },
                "requeue",
                Step {
                    audit: vec![NewAuditEntry::new(
                        actor,
                        "requeued",
                        json!({ "reason": reason, "previous_status": previous }),
                    )],
                    release_lease: true,
                    ..Step::default()
                },
                now,
            )
            .await?;
        info!(request_id, actor, reason, "request requeued");
        Ok(DeliveryStatusView::from(&request))
    }

    /// Abort a request that is pending, or failed with retries remaining.
    pub async fn admin_abort(
        &self,
        request_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<DeliveryStatusView, CourierError> {
        let now = self.ctx.clock.now();
        let stored = requests::get_request(&self.ctx.db, request_id)
            .await?
            .ok_or_else(|| CourierError::not_found("request", request_id))?;
        let lease_active = stored.lease_active(now);
        let version = stored.version;
        let mut request = stored.request;

        let abortable = match request.status {
            DeliveryStatus::Pending => true,
            DeliveryStatus::Failed => {
                let zone = catalog::get_zone_policy(&self.ctx.db, &request.zone_code)
                    .await?
                    .ok_or_else(|| CourierError::not_found("zone", &request.zone_code))?;
                request.counted_attempts() < zone.max_retries
            }
            DeliveryStatus::Delivered | DeliveryStatus::Aborted => false,
        };
        if !abortable || lease_active {
            return Err(invalid_transition(&request.id, request.status, lease_active, "abort"));
        }

        request.awaiting_callback = None;
        let previous = request.status;
        request.status = DeliveryStatus::Aborted;
        request.failure_reason = Some(reason.to_string());

        self.ctx
            .apply(
                &mut request,
                TransitionGuard::Version { version },
                "abort",
                Step {
                    audit: vec![NewAuditEntry::new(
                        actor,
                        "aborted",
                        json!({ "reason": reason, "previous_status": previous }),
                    )],
                    release_lease: true,
                    ..Step::default()
                },
                now,
            )
            .await?;
        info!(request_id, actor, reason, "request aborted");
        Ok(DeliveryStatusView::from(&request))
    }

    // --- asynchronous provider results ---

    /// Verify and apply a signed provider callback.
    pub async fn provider_inbound_callback(
        &self,
        body: &[u8],
        signature_hex: &str,
    ) -> Result<DeliveryStatusView, CourierError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| CourierError::Signature("no callback secret configured".into()))?;
        let now = self.ctx.clock.now();
        let payload = verifier.verify(body, signature_hex, now)?;
        self.apply_callback(payload, now).await
    }

    async fn apply_callback(
        &self,
        payload: CallbackPayload,
        now: DateTime<Utc>,
    ) -> Result<DeliveryStatusView, CourierError> {
        let vendor_id = payload.provider_request_id.clone();
        let stored = requests::find_by_provider_request(&self.ctx.db, &vendor_id)
            .await?
            .ok_or_else(|| CourierError::not_found("awaited callback", &vendor_id))?;
        let version = stored.version;
        let mut request = stored.request;
        let accepted = request
            .attempts
            .iter()
            .rev()
            .find(|a| a.outcome == AttemptOutcome::Accepted && a.provider_request_id.as_deref() == Some(&vendor_id))
            .cloned()
            .ok_or_else(|| CourierError::not_found("accepted attempt", &vendor_id))?;
        let snapshot = self.ctx.catalog.snapshot(now).await?;
        let zone = snapshot
            .zone(&request.zone_code)
            .cloned()
            .ok_or_else(|| CourierError::not_found("zone", &request.zone_code))?;

        let reservation = self.ctx.budget.held(&request.id).await?;
        let outcome = AttemptOutcome::from(payload.outcome);
        let delivered = outcome == AttemptOutcome::Delivered;
        let cost = if delivered {
            payload
                .cost
                .map(round6)
                .unwrap_or_else(|| reservation.as_ref().map_or(0.0, |r| r.amount()))
        } else {
            0.0
        };
        let attempt = AttemptRecord {
            provider_id: accepted.provider_id.clone(),
            channel: accepted.channel,
            attempted_at: now,
            outcome,
            latency_ms: (payload.timestamp - accepted.attempted_at).num_milliseconds().max(0) as u64,
            cost,
            detail: payload.detail.clone().unwrap_or_default(),
            provider_request_id: Some(vendor_id.clone()),
        };
        request.awaiting_callback = None;

        let mut audits = Vec::new();
        let mut spend = None;
        if delivered {
            request.status = DeliveryStatus::Delivered;
            request.failure_reason = None;
            audits.push(NewAuditEntry::new(
                &accepted.provider_id,
                "callback_delivered",
                json!({ "provider_request_id": vendor_id, "cost": cost }),
            ));
            if accepted.channel.is_metered() {
                let geography = match &reservation {
                    Some(r) => r.geography().clone(),
                    None => {
                        snapshot
                            .voice
                            .resolve_rule(&request.country, request.region.as_deref(), request.city.as_deref())
                            .geography
                    }
                };
                spend = Some(BudgetSpend {
                    geography,
                    amount: cost,
                    at: now,
                });
            }
        } else {
            let counted = request.counted_attempts() + 1;
            audits.push(NewAuditEntry::new(
                &accepted.provider_id,
                "callback_failed",
                json!({ "provider_request_id": vendor_id, "outcome": outcome, "detail": payload.detail }),
            ));
            let terminal = if outcome == AttemptOutcome::PermanentFailure {
                Some("permanent_failure")
            } else if counted >= zone.max_retries {
                Some("max_retries_exhausted")
            } else {
                None
            };
            match terminal {
                Some(reason) => {
                    request.status = DeliveryStatus::Failed;
                    request.failure_reason = Some(reason.to_string());
                    audits.push(NewAuditEntry::new(
                        &accepted.provider_id,
                        reason,
                        json!({ "attempts": counted, "max_retries": zone.max_retries }),
                    ));
                }
                None => request.next_attempt_at = now,
            }
        }

        self.ctx
            .apply(
                &mut request,
                TransitionGuard::Version { version },
                "apply callback",
                Step {
                    attempt: Some((attempt, false)),
                    audit: audits,
                    spend,
                    release_lease: true,
                },
                now,
            )
            .await?;
        info!(
            request_id = request.id.as_str(),
            provider_request_id = vendor_id.as_str(),
            outcome = %outcome,
            "provider callback applied"
        );
        Ok(DeliveryStatusView::from(&request))
    }
}

fn invalid_transition(request_id: &str, status: DeliveryStatus, lease_active: bool, action: &str) -> CourierError {
    let status = if lease_active {
        format!("{status} with an attempt in flight")
    } else {
        status.to_string()
    };
    CourierError::InvalidTransition {
        request_id: request_id.to_string(),
        status,
        action: action.to_string(),
    }
}
