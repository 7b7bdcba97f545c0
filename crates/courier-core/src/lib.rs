// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier notification delivery engine.
//!
//! This crate provides the error taxonomy, the domain types persisted and
//! exchanged by the engine, and the capability traits (`DeliveryProvider`,
//! `Clock`) implemented at its seams.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CourierError, ProviderError};
pub use traits::{Clock, DeliveryProvider, DispatchRequest, ProviderReceipt, SystemClock};
pub use types::{
    AttemptLog, AttemptOutcome, AttemptRecord, AuditEntry, Channel, ChannelFlags, DeliveryRequest,
    DeliveryStatus, DeliveryStatusView, GeographyKey, HourWindow, MetricsAggregate,
    NewDeliveryRequest, Priority, Provider, ProviderCapability, QuietHours, RoutingRule,
    UserPreferences, VoiceRule, ZonePolicy, ZonePolicyPatch,
};
