// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider capability trait for vendor integrations (SMS gateways, TTS, push, ...).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;
use crate::types::Channel;

/// What a provider receives for one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub request_id: String,
    pub subject_ref: String,
    pub channel: Channel,
    pub zone_code: String,
    pub language: String,
    pub currency: String,
    pub payload: serde_json::Value,
    /// Cost quoted for this attempt after zone markup.
    pub quoted_cost: f64,
    /// Upper bound on message length for voice calls.
    pub max_message_seconds: Option<u32>,
}

/// Successful provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReceipt {
    /// Delivery confirmed synchronously.
    Delivered {
        provider_request_id: Option<String>,
        /// Actual cost if the vendor reports one; the quoted cost otherwise.
        cost: Option<f64>,
        detail: String,
    },
    /// Accepted for asynchronous processing; the outcome arrives by callback.
    Accepted {
        provider_request_id: String,
        detail: String,
    },
}

/// A concrete vendor adapter.
///
/// Adapters are chosen only by the provider registry ordering and looked up
/// by catalog id; the engine never branches on a provider's name.
#[async_trait]
pub trait DeliveryProvider: Send + Sync + 'static {
    /// Catalog id this adapter serves.
    fn provider_id(&self) -> &str;

    /// Perform one delivery attempt.
    async fn attempt_deliver(
        &self,
        request: &DispatchRequest,
    ) -> Result<ProviderReceipt, ProviderError>;
}
