// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification delivery engine.
//!
//! [`DeliveryEngine`] is the entry point for producers and operators:
//! enqueue, status, catalog and request administration, provider callbacks.
//! [`DeliveryWorker`]s claim ready requests and drive each one through its
//! provider chain with retry, backoff, budget checks and atomic
//! attempt/audit/metrics writes. Terminal results are published on the
//! engine's [`courier_bus::EventBus`].

pub mod adapters;
pub mod backoff;
pub mod callback;
pub mod catalog;
mod context;
pub mod engine;
pub mod shutdown;
pub mod worker;

pub use adapters::ProviderAdapters;
pub use callback::{CallbackOutcome, CallbackPayload, CallbackVerifier, sign};
pub use catalog::{CatalogCache, CatalogSnapshot};
pub use engine::DeliveryEngine;
pub use shutdown::{drain_workers, install_signal_handler};
pub use worker::{DeliveryWorker, WorkerSettings};
