// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides scripted provider adapters, a manual clock and a test harness
//! for fast, deterministic tests without external services.
//!
//! # Components
//!
//! - [`ScriptedProvider`] - provider adapter replaying a queue of outcomes
//! - [`ManualClock`] - clock advanced explicitly by the test
//! - [`TestHarness`] - temp database, engine and catalog seeding

pub mod clock;
pub mod harness;
pub mod scripted_provider;

pub use clock::ManualClock;
pub use harness::{ADMIN, CALLBACK_SECRET, TestHarness, TestHarnessBuilder, new_request, provider, zone_policy};
pub use scripted_provider::{Scripted, ScriptedProvider};
