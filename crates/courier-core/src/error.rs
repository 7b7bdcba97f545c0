// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier delivery engine.

use thiserror::Error;

/// The primary error type used across the Courier workspace.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Request rejected at enqueue (missing channel, empty payload, ...). Never persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown request, zone, provider, or rule.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Routing resolved to an empty candidate set.
    #[error("no eligible channel: {reason}")]
    NoEligibleChannel { reason: String },

    /// No active provider matches the channel and zone.
    #[error("no provider available for {channel} in zone {zone_code}")]
    NoProviderAvailable { channel: String, zone_code: String },

    /// A metered channel would exceed its daily or monthly cap.
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// Retry-eligible provider failure (timeout, 5xx-equivalent).
    #[error("provider {provider_id} transient failure: {message}")]
    ProviderTransient {
        provider_id: String,
        message: String,
    },

    /// Non-retryable provider failure (invalid recipient, malformed number).
    #[error("provider {provider_id} permanent failure: {message}")]
    ProviderPermanent {
        provider_id: String,
        message: String,
    },

    /// A status transition that the lifecycle does not allow.
    #[error("request {request_id} cannot {action} while {status}")]
    InvalidTransition {
        request_id: String,
        status: String,
        action: String,
    },

    /// The worker no longer holds the lease on a claimed request.
    #[error("lease lost on request {request_id}")]
    LeaseLost { request_id: String },

    /// Inbound callback failed signature or freshness verification.
    #[error("signature rejected: {0}")]
    Signature(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for [`CourierError::NotFound`].
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        CourierError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}

/// Failure reported by a [`DeliveryProvider`](crate::traits::DeliveryProvider) adapter.
///
/// The worker classifies attempts only through this type, never by
/// inspecting provider names or message text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Retry-eligible failure.
    #[error("transient: {0}")]
    Transient(String),
    /// Non-retryable failure; the remaining chain is skipped.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Convert into the engine-wide error, tagging the provider.
    pub fn into_courier(self, provider_id: &str) -> CourierError {
        match self {
            ProviderError::Transient(message) => CourierError::ProviderTransient {
                provider_id: provider_id.to_string(),
                message,
            },
            ProviderError::Permanent(message) => CourierError::ProviderPermanent {
                provider_id: provider_id.to_string(),
                message,
            },
        }
    }
}
