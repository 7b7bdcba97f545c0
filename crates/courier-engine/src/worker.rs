// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery worker: claim, attempt chain, retry or terminal state.
//!
//! A worker claims a batch of ready requests under a time-bounded lease and
//! processes them concurrently. Within one request the provider chain runs
//! strictly in order and stops at the first success. Every attempt is
//! persisted (attempt record, audit entries, daily aggregate, request state)
//! in one transaction guarded by the lease.
//!
//! The lease is renewed before each provider call. A request whose lease has
//! lapsed while it sat in the batch is dropped untouched, since another
//! worker may already own it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Timelike, Utc};
use courier_config::WorkerConfig;
use courier_core::{
    AttemptOutcome, AttemptRecord, Channel, CourierError, DeliveryRequest, DeliveryStatus,
    DispatchRequest, Provider, ProviderError, ProviderReceipt, ZonePolicy,
};
use courier_cost::{compute_cost, round6};
use courier_router::{
    RoutingDecision, RoutingQuery, SubjectProfile, filter_voice, filter_zone_channels,
    subject_timezone,
};
use courier_storage::queries::requests;
use courier_storage::{BudgetSpend, NewAuditEntry, StoredRequest, TransitionGuard};
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::backoff_delay;
use crate::catalog::CatalogSnapshot;
use crate::context::{EngineContext, Step};

/// Worker timing and batching knobs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub batch_concurrency: usize,
    pub poll_interval: std::time::Duration,
    pub lease: Duration,
    pub attempt_timeout: std::time::Duration,
    pub catalog_error_backoff: Duration,
    pub max_jitter_ms: u64,
    /// Callback wait for asynchronous non-voice providers. Voice uses the
    /// resolved rule's `fallback_delay_seconds`.
    pub default_callback_wait: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_concurrency: config.batch_concurrency,
            poll_interval: std::time::Duration::from_millis(config.poll_interval_ms),
            lease: Duration::seconds(config.lease_seconds as i64),
            attempt_timeout: std::time::Duration::from_millis(config.attempt_timeout_ms),
            catalog_error_backoff: Duration::seconds(config.catalog_error_backoff_seconds as i64),
            max_jitter_ms: config.max_jitter_ms,
            default_callback_wait: Duration::seconds(config.default_callback_wait_seconds as i64),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// One polling worker. Cheap to create; all state lives in the engine.
pub struct DeliveryWorker {
    ctx: Arc<EngineContext>,
    worker_id: String,
}

impl DeliveryWorker {
    pub(crate) fn new(ctx: Arc<EngineContext>, worker_id: String) -> Self {
        Self { ctx, worker_id }
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    /// Poll until `cancel` fires. The current batch always runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = self.worker_id.as_str(), "delivery worker started");
        while !cancel.is_cancelled() {
            let claimed = match self.run_once().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(worker_id = self.worker_id.as_str(), error = %e, "claim failed");
                    0
                }
            };
            if claimed == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.ctx.settings.poll_interval) => {}
                }
            }
        }
        info!(worker_id = self.worker_id.as_str(), "delivery worker stopped");
    }

    /// Claim one batch and process it. Returns how many requests were claimed.
    pub async fn run_once(&self) -> Result<usize, CourierError> {
        let settings = &self.ctx.settings;
        let batch = requests::claim_batch(
            &self.ctx.db,
            &self.worker_id,
            self.ctx.clock.now(),
            settings.lease,
            settings.batch_size,
        )
        .await?;
        let claimed = batch.len();
        if claimed == 0 {
            return Ok(0);
        }
        courier_prometheus::record_claimed(claimed);

        futures::stream::iter(batch)
            .for_each_concurrent(settings.batch_concurrency.max(1), |stored| async move {
                let request_id = stored.request.id.clone();
                if let Err(e) = self.process(stored).await {
                    match e {
                        CourierError::LeaseLost { .. } => warn!(
                            worker_id = self.worker_id.as_str(),
                            request_id = request_id.as_str(),
                            "lease lost mid-chain, abandoning request"
                        ),
                        other => {
                            error!(
                                worker_id = self.worker_id.as_str(),
                                request_id = request_id.as_str(),
                                error = %other,
                                "request processing failed"
                            );
                            if let Err(e) =
                                requests::release_lease(&self.ctx.db, &request_id, &self.worker_id).await
                            {
                                error!(request_id = request_id.as_str(), error = %e, "lease release failed");
                            }
                        }
                    }
                }
            })
            .await;
        Ok(claimed)
    }

    fn guard(&self) -> TransitionGuard {
        TransitionGuard::Lease {
            worker_id: self.worker_id.clone(),
        }
    }

    /// Extend this worker's lease before touching a provider.
    async fn renew_lease(&self, request_id: &str) -> Result<(), CourierError> {
        let renewed = requests::renew_lease(
            &self.ctx.db,
            request_id,
            &self.worker_id,
            self.ctx.clock.now(),
            self.ctx.settings.lease,
        )
        .await?;
        if renewed {
            Ok(())
        } else {
            Err(CourierError::LeaseLost {
                request_id: request_id.to_string(),
            })
        }
    }

    fn audit(&self, action: &str, details: serde_json::Value) -> NewAuditEntry {
        NewAuditEntry::new(&self.worker_id, action, details)
    }

    async fn process(&self, stored: StoredRequest) -> Result<(), CourierError> {
        let mut request = stored.request;
        self.renew_lease(&request.id).await?;
        let now = self.ctx.clock.now();
        let mut audits = Vec::new();

        let snapshot = match self.ctx.catalog.snapshot(now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(request_id = request.id.as_str(), error = %e, "catalog unavailable, deferring request");
                let until = now + self.ctx.settings.catalog_error_backoff;
                audits.push(self.audit("catalog_unavailable", json!({ "error": e.to_string() })));
                return self.defer(&mut request, until, audits, now).await;
            }
        };
        let Some(zone) = snapshot.zone(&request.zone_code).cloned() else {
            warn!(
                request_id = request.id.as_str(),
                zone_code = request.zone_code.as_str(),
                "zone policy missing, deferring request"
            );
            let until = now + self.ctx.settings.catalog_error_backoff;
            audits.push(self.audit("zone_policy_missing", json!({ "zone_code": request.zone_code })));
            return self.defer(&mut request, until, audits, now).await;
        };

        let mut resume_after = None;
        if let Some(vendor_id) = request.awaiting_callback.clone() {
            resume_after = self.expire_callback(&mut request, &vendor_id, &zone).await?;
            if request.status.is_terminal() {
                return Ok(());
            }
        }

        self.run_chain(request, &snapshot, &zone, resume_after, audits).await
    }

    /// The callback window of an accepted attempt elapsed: record a timeout,
    /// which also drops the held budget. Returns the (channel, provider) to
    /// resume the chain after.
    async fn expire_callback(
        &self,
        request: &mut DeliveryRequest,
        vendor_id: &str,
        zone: &ZonePolicy,
    ) -> Result<Option<(Channel, String)>, CourierError> {
        let now = self.ctx.clock.now();
        let accepted = request
            .attempts
            .iter()
            .rev()
            .find(|a| a.outcome == AttemptOutcome::Accepted && a.provider_request_id.as_deref() == Some(vendor_id))
            .cloned();
        request.awaiting_callback = None;

        let Some(accepted) = accepted else {
            warn!(
                request_id = request.id.as_str(),
                provider_request_id = vendor_id,
                "awaited callback has no accepted attempt, restarting chain"
            );
            return Ok(None);
        };

        let attempt = AttemptRecord {
            provider_id: accepted.provider_id.clone(),
            channel: accepted.channel,
            attempted_at: now,
            outcome: AttemptOutcome::Timeout,
            latency_ms: (now - accepted.attempted_at).num_milliseconds().max(0) as u64,
            cost: 0.0,
            detail: "callback window elapsed".to_string(),
            provider_request_id: Some(vendor_id.to_string()),
        };
        let counted = request.counted_attempts() + 1;
        let mut audit = vec![self.audit(
            "callback_timeout",
            json!({ "provider_id": accepted.provider_id, "provider_request_id": vendor_id }),
        )];
        info!(
            request_id = request.id.as_str(),
            provider_id = accepted.provider_id.as_str(),
            "callback window elapsed"
        );

        let terminal = counted >= zone.max_retries;
        if terminal {
            request.status = DeliveryStatus::Failed;
            request.failure_reason = Some("max_retries_exhausted".to_string());
            audit.push(self.audit(
                "max_retries_exhausted",
                json!({ "attempts": counted, "max_retries": zone.max_retries }),
            ));
        }
        self.ctx
            .apply(
                request,
                self.guard(),
                "expire callback",
                Step {
                    attempt: Some((attempt, false)),
                    audit,
                    spend: None,
                    release_lease: terminal,
                },
                now,
            )
            .await?;
        Ok((!terminal).then_some((accepted.channel, accepted.provider_id)))
    }

    async fn run_chain(
        &self,
        mut request: DeliveryRequest,
        snapshot: &CatalogSnapshot,
        zone: &ZonePolicy,
        resume_after: Option<(Channel, String)>,
        mut audits: Vec<NewAuditEntry>,
    ) -> Result<(), CourierError> {
        let now = self.ctx.clock.now();

        let channels = match self
            .ctx
            .resolver
            .resolve(&snapshot.routing, RoutingQuery::from(&request), now)
        {
            Ok(RoutingDecision::Route(channels)) => channels,
            Ok(RoutingDecision::Defer { until }) => {
                audits.push(self.audit("deferred_quiet_hours", json!({ "until": until })));
                return self.defer(&mut request, until, audits, now).await;
            }
            Err(CourierError::NoEligibleChannel { reason }) => {
                return self
                    .fail(&mut request, "no_eligible_channel", json!({ "reason": reason }), audits, now)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let rule = snapshot.voice.resolve_rule(
            &request.country,
            request.region.as_deref(),
            request.city.as_deref(),
        );
        let local_hour = now.with_timezone(&subject_timezone(&request.preferences)).hour();
        let filtered = filter_voice(channels, &rule, local_hour);
        if let Some(reason) = filtered.vetoed {
            audits.push(self.audit("voice_vetoed", json!({ "reason": reason, "rule": rule.geography })));
        }
        let channels = filter_zone_channels(filtered.channels, zone);
        if channels.is_empty() {
            return self
                .fail(
                    &mut request,
                    "no_eligible_channel",
                    json!({ "reason": "voice or zone policy removed every candidate channel" }),
                    audits,
                    now,
                )
                .await;
        }

        let subject = SubjectProfile {
            region: request.region.as_deref(),
            language: &request.language,
        };
        let mut chain: Vec<(Channel, Provider)> = Vec::new();
        for channel in &channels {
            let preferred: &[String] = if *channel == Channel::Voice {
                &rule.preferred_providers
            } else {
                &[]
            };
            chain.extend(
                snapshot
                    .providers
                    .select(*channel, &request.zone_code, subject, preferred)
                    .into_iter()
                    .map(|p| (*channel, p)),
            );
        }
        let start = resume_after
            .as_ref()
            .and_then(|(channel, id)| chain.iter().position(|(c, p)| c == channel && p.id == *id))
            .map_or(0, |i| i + 1);
        debug!(
            request_id = request.id.as_str(),
            channels = ?channels,
            providers = chain.len(),
            start,
            "attempt chain resolved"
        );

        let mut attempted = resume_after.is_some();
        let mut budget_blocked = false;

        for (channel, provider) in chain.into_iter().skip(start) {
            let quoted = compute_cost(provider.base_cost, zone);
            let Some(adapter) = self.ctx.adapters.get(&provider.id) else {
                warn!(
                    request_id = request.id.as_str(),
                    provider_id = provider.id.as_str(),
                    "no adapter bound to provider, skipping"
                );
                audits.push(self.audit("adapter_missing", json!({ "provider_id": provider.id })));
                continue;
            };
            self.renew_lease(&request.id).await?;

            let reservation = if channel.is_metered() {
                match self
                    .ctx
                    .budget
                    .reserve(&rule, &rule.geography, &request.id, quoted, self.ctx.clock.now())
                    .await
                {
                    Ok(reservation) => Some(reservation),
                    Err(CourierError::BudgetExceeded { message }) => {
                        budget_blocked = true;
                        courier_prometheus::record_budget_rejection(&rule.geography.to_string());
                        info!(
                            request_id = request.id.as_str(),
                            provider_id = provider.id.as_str(),
                            reason = message.as_str(),
                            "metered attempt rejected by budget"
                        );
                        audits.push(self.audit(
                            "budget_rejected",
                            json!({ "provider_id": provider.id, "channel": channel, "reason": message }),
                        ));
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                None
            };
            attempted = true;

            let dispatch = DispatchRequest {
                request_id: request.id.clone(),
                subject_ref: request.subject_ref.clone(),
                channel,
                zone_code: request.zone_code.clone(),
                language: request.language.clone(),
                currency: request.currency.clone(),
                payload: request.payload.clone(),
                quoted_cost: quoted,
                max_message_seconds: (channel == Channel::Voice).then_some(rule.max_message_seconds),
            };
            let attempted_at = self.ctx.clock.now();
            let started = Instant::now();
            let result =
                tokio::time::timeout(self.ctx.settings.attempt_timeout, adapter.attempt_deliver(&dispatch)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let (outcome, detail) = match result {
                Ok(Ok(ProviderReceipt::Delivered {
                    provider_request_id,
                    cost,
                    detail,
                })) => {
                    let actual = cost.map(round6).unwrap_or(quoted);
                    let attempt = AttemptRecord {
                        provider_id: provider.id.clone(),
                        channel,
                        attempted_at,
                        outcome: AttemptOutcome::Delivered,
                        latency_ms,
                        cost: actual,
                        detail,
                        provider_request_id,
                    };
                    request.status = DeliveryStatus::Delivered;
                    request.failure_reason = None;
                    audits.push(self.audit(
                        "delivered",
                        json!({ "provider_id": provider.id, "channel": channel, "cost": actual }),
                    ));
                    let spend = reservation.as_ref().map(|r| BudgetSpend {
                        geography: r.geography().clone(),
                        amount: actual,
                        at: attempted_at,
                    });
                    self.ctx
                        .apply(
                            &mut request,
                            self.guard(),
                            "deliver",
                            Step {
                                attempt: Some((attempt, true)),
                                audit: audits,
                                spend,
                                release_lease: true,
                            },
                            attempted_at,
                        )
                        .await?;
                    return Ok(());
                }
                Ok(Ok(ProviderReceipt::Accepted {
                    provider_request_id,
                    detail,
                })) => {
                    let wait = if channel == Channel::Voice {
                        Duration::seconds(rule.fallback_delay_seconds as i64)
                    } else {
                        self.ctx.settings.default_callback_wait
                    };
                    let attempt = AttemptRecord {
                        provider_id: provider.id.clone(),
                        channel,
                        attempted_at,
                        outcome: AttemptOutcome::Accepted,
                        latency_ms,
                        cost: 0.0,
                        detail,
                        provider_request_id: Some(provider_request_id.clone()),
                    };
                    request.awaiting_callback = Some(provider_request_id.clone());
                    request.next_attempt_at = attempted_at + wait;
                    audits.push(self.audit(
                        "accepted",
                        json!({
                            "provider_id": provider.id,
                            "provider_request_id": provider_request_id,
                            "wait_seconds": wait.num_seconds(),
                        }),
                    ));
                    self.ctx
                        .apply(
                            &mut request,
                            self.guard(),
                            "accept",
                            Step {
                                attempt: Some((attempt, true)),
                                audit: audits,
                                spend: None,
                                release_lease: true,
                            },
                            attempted_at,
                        )
                        .await?;
                    return Ok(());
                }
                Ok(Err(ProviderError::Transient(message))) => (AttemptOutcome::TransientFailure, message),
                Ok(Err(ProviderError::Permanent(message))) => (AttemptOutcome::PermanentFailure, message),
                Err(_) => (
                    AttemptOutcome::Timeout,
                    format!("attempt timed out after {:?}", self.ctx.settings.attempt_timeout),
                ),
            };

            warn!(
                request_id = request.id.as_str(),
                provider_id = provider.id.as_str(),
                channel = %channel,
                outcome = %outcome,
                detail = detail.as_str(),
                "attempt failed"
            );

            let attempt = AttemptRecord {
                provider_id: provider.id.clone(),
                channel,
                attempted_at,
                outcome,
                latency_ms,
                cost: 0.0,
                detail: detail.clone(),
                provider_request_id: None,
            };
            let counted = request.counted_attempts() + 1;
            audits.push(self.audit(
                "attempt_failed",
                json!({ "provider_id": provider.id, "channel": channel, "outcome": outcome, "detail": detail }),
            ));

            let terminal = if outcome == AttemptOutcome::PermanentFailure {
                Some("permanent_failure")
            } else if counted >= zone.max_retries {
                Some("max_retries_exhausted")
            } else {
                None
            };
            if let Some(reason) = terminal {
                request.status = DeliveryStatus::Failed;
                request.failure_reason = Some(reason.to_string());
                audits.push(self.audit(
                    reason,
                    json!({ "attempts": counted, "max_retries": zone.max_retries }),
                ));
            }
            self.ctx
                .apply(
                    &mut request,
                    self.guard(),
                    "record attempt",
                    Step {
                        attempt: Some((attempt, true)),
                        audit: std::mem::take(&mut audits),
                        spend: None,
                        release_lease: terminal.is_some(),
                    },
                    attempted_at,
                )
                .await?;
            if terminal.is_some() {
                return Ok(());
            }
        }

        let now = self.ctx.clock.now();
        if !attempted {
            let (reason, details) = if budget_blocked {
                ("budget_exceeded", json!({ "geography": rule.geography }))
            } else {
                (
                    "no_provider_available",
                    json!({ "channels": channels, "zone_code": request.zone_code }),
                )
            };
            return self.fail(&mut request, reason, details, audits, now).await;
        }

        let delay = backoff_delay(
            request.retry_count,
            zone.max_backoff_seconds,
            self.ctx.settings.max_jitter_ms,
            &mut rand::thread_rng(),
        );
        request.retry_count += 1;
        request.next_attempt_at = now + delay;
        audits.push(self.audit(
            "retry_scheduled",
            json!({
                "retry_count": request.retry_count,
                "next_attempt_at": request.next_attempt_at,
                "delay_ms": delay.num_milliseconds(),
            }),
        ));
        info!(
            request_id = request.id.as_str(),
            retry_count = request.retry_count,
            next_attempt_at = %request.next_attempt_at,
            "chain exhausted, retry scheduled"
        );
        self.ctx
            .apply(
                &mut request,
                self.guard(),
                "schedule retry",
                Step {
                    audit: audits,
                    release_lease: true,
                    ..Step::default()
                },
                now,
            )
            .await
    }

    /// Put the request back to sleep until `until` without an attempt.
    async fn defer(
        &self,
        request: &mut DeliveryRequest,
        until: DateTime<Utc>,
        audits: Vec<NewAuditEntry>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        request.next_attempt_at = until;
        debug!(request_id = request.id.as_str(), %until, "request deferred");
        self.ctx
            .apply(
                request,
                self.guard(),
                "defer",
                Step {
                    audit: audits,
                    release_lease: true,
                    ..Step::default()
                },
                now,
            )
            .await
    }

    /// Terminal failure without a further attempt.
    async fn fail(
        &self,
        request: &mut DeliveryRequest,
        reason: &str,
        details: serde_json::Value,
        mut audits: Vec<NewAuditEntry>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        request.status = DeliveryStatus::Failed;
        request.failure_reason = Some(reason.to_string());
        audits.push(self.audit(reason, details));
        self.ctx
            .apply(
                request,
                self.guard(),
                "fail",
                Step {
                    audit: audits,
                    release_lease: true,
                    ..Step::default()
                },
                now,
            )
            .await
    }
}
