// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete provider adapters bound from `[[providers]]` configuration.
//!
//! The webhook adapter forwards each dispatch as JSON to a vendor gateway.
//! Status classes map onto the engine's outcome taxonomy:
//!
//! | Response | Outcome |
//! |---|---|
//! | 200, 201, 204 | delivered (body may carry `provider_request_id`, `cost`) |
//! | 202 | accepted, `provider_request_id` required in the body |
//! | 408, 429, 5xx, network error | transient |
//! | other 4xx | permanent |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::{AdapterKind, CourierConfig, ProviderAdapterConfig};
use courier_core::{CourierError, DeliveryProvider, DispatchRequest, ProviderError, ProviderReceipt};
use courier_engine::ProviderAdapters;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Optional body a gateway returns on success.
#[derive(Debug, Default, Deserialize)]
struct GatewayReply {
    #[serde(default)]
    provider_request_id: Option<String>,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    detail: Option<String>,
}

/// Forwards dispatches to an HTTP endpoint.
pub struct WebhookProvider {
    id: String,
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            id: id.into(),
            url: url.into(),
            auth_token,
            client,
        })
    }
}

impl std::fmt::Debug for WebhookProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookProvider")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn classify(status: StatusCode, reply: GatewayReply) -> Result<ProviderReceipt, ProviderError> {
    let detail = reply.detail.unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::ACCEPTED => match reply.provider_request_id {
            Some(provider_request_id) => Ok(ProviderReceipt::Accepted {
                provider_request_id,
                detail,
            }),
            None => Err(ProviderError::Transient(
                "gateway accepted without a provider_request_id".to_string(),
            )),
        },
        s if s.is_success() => Ok(ProviderReceipt::Delivered {
            provider_request_id: reply.provider_request_id,
            cost: reply.cost,
            detail,
        }),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(ProviderError::Transient(detail))
        }
        s if s.is_client_error() => Err(ProviderError::Permanent(detail)),
        _ => Err(ProviderError::Transient(detail)),
    }
}

#[async_trait]
impl DeliveryProvider for WebhookProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn attempt_deliver(
        &self,
        request: &DispatchRequest,
    ) -> Result<ProviderReceipt, ProviderError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(provider_id = %self.id, error = %e, "gateway request failed");
            ProviderError::Transient(format!("gateway unreachable: {e}"))
        })?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        let reply = if body.is_empty() {
            GatewayReply::default()
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|e| {
                debug!(provider_id = %self.id, error = %e, "gateway body is not a JSON reply");
                GatewayReply::default()
            })
        };

        debug!(
            provider_id = %self.id,
            request_id = %request.request_id,
            status = status.as_u16(),
            "gateway responded"
        );
        classify(status, reply)
    }
}

/// Dry-run adapter: logs the dispatch and reports it delivered.
#[derive(Debug)]
pub struct LogProvider {
    id: String,
}

impl LogProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl DeliveryProvider for LogProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn attempt_deliver(
        &self,
        request: &DispatchRequest,
    ) -> Result<ProviderReceipt, ProviderError> {
        info!(
            provider_id = %self.id,
            request_id = %request.request_id,
            channel = %request.channel,
            zone_code = %request.zone_code,
            quoted_cost = request.quoted_cost,
            "dry-run dispatch"
        );
        Ok(ProviderReceipt::Delivered {
            provider_request_id: None,
            cost: None,
            detail: "logged".to_string(),
        })
    }
}

fn build_adapter(
    entry: &ProviderAdapterConfig,
    timeout: Duration,
) -> Result<Arc<dyn DeliveryProvider>, CourierError> {
    match entry.kind {
        AdapterKind::Webhook => {
            let url = entry.url.as_deref().ok_or_else(|| {
                CourierError::Config(format!("provider {} is a webhook without a url", entry.id))
            })?;
            Ok(Arc::new(WebhookProvider::new(
                &entry.id,
                url,
                entry.auth_token.clone(),
                timeout,
            )?))
        }
        AdapterKind::Log => Ok(Arc::new(LogProvider::new(&entry.id))),
    }
}

/// Build the adapter set from `[[providers]]`.
///
/// HTTP timeouts follow the worker's attempt timeout so a slow gateway fails
/// inside the attempt rather than being cut off by it.
pub fn build_adapters(config: &CourierConfig) -> Result<ProviderAdapters, CourierError> {
    let timeout = Duration::from_millis(config.worker.attempt_timeout_ms);
    let mut adapters = ProviderAdapters::new();
    for entry in &config.providers {
        adapters.register(build_adapter(entry, timeout)?);
    }
    info!(count = adapters.len(), "provider adapters initialized");
    Ok(adapters)
}
