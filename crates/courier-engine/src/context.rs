// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State shared by the engine facade and its workers, and the single path
//! through which request state changes are persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_bus::{DeliveryEvent, EventBus};
use courier_core::{AttemptRecord, Clock, CourierError, DeliveryRequest};
use courier_cost::BudgetGuard;
use courier_router::RoutingResolver;
use courier_storage::queries::requests;
use courier_storage::{
    BudgetSpend, Database, MetricsSample, NewAuditEntry, RequestState, Transition, TransitionGuard,
};
use tracing::{debug, info};

use crate::adapters::ProviderAdapters;
use crate::catalog::CatalogCache;
use crate::worker::WorkerSettings;

pub(crate) struct EngineContext {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
    pub catalog: CatalogCache,
    pub budget: BudgetGuard,
    pub adapters: ProviderAdapters,
    pub bus: EventBus,
    pub resolver: RoutingResolver,
    pub settings: WorkerSettings,
}

/// Side records written together with a state change.
#[derive(Debug, Default)]
pub(crate) struct Step {
    /// Attempt to append, and whether it counts as a dispatch in the daily
    /// `sent` counter.
    pub attempt: Option<(AttemptRecord, bool)>,
    pub audit: Vec<NewAuditEntry>,
    /// Books the request's budget hold as spent. Without it the hold is
    /// dropped, unless the request is left awaiting a callback.
    pub spend: Option<BudgetSpend>,
    pub release_lease: bool,
}

impl EngineContext {
    /// Persist `request`'s current state with `step`, all or nothing.
    ///
    /// On success the attempt is appended to the in-memory log and terminal
    /// results are published on the bus.
    pub async fn apply(
        &self,
        request: &mut DeliveryRequest,
        guard: TransitionGuard,
        action: &str,
        step: Step,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let Step {
            attempt,
            audit,
            spend,
            release_lease,
        } = step;
        let metrics = attempt
            .as_ref()
            .map(|(record, sent)| MetricsSample::from_attempt(record, &request.zone_code, *sent));

        requests::commit_transition(
            &self.db,
            Transition {
                request_id: request.id.clone(),
                guard,
                action: action.to_string(),
                state: RequestState::of(request),
                release_lease,
                attempt: attempt.as_ref().map(|(record, _)| record.clone()),
                metrics,
                audit,
                spend,
                at,
            },
        )
        .await?;

        request.updated_at = at;
        if let Some((record, _)) = attempt {
            courier_prometheus::record_attempt(
                record.channel,
                &request.zone_code,
                record.outcome,
                record.latency_ms,
                record.cost,
            );
            request.attempts.append(record);
        }

        if let Some(event) = DeliveryEvent::terminal(request, at) {
            courier_prometheus::record_terminal(request.status, &request.zone_code);
            info!(
                request_id = request.id.as_str(),
                status = %request.status,
                attempts = request.attempts.len(),
                reason = request.failure_reason.as_deref().unwrap_or(""),
                "request reached terminal status"
            );
            self.bus.publish(event);
        } else {
            debug!(
                request_id = request.id.as_str(),
                action,
                next_attempt_at = %request.next_attempt_at,
                "request transition committed"
            );
        }
        Ok(())
    }
}
