// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost calculation and budget enforcement for the Courier delivery engine.
//!
//! - **Pricing**: provider base cost with zone markup, clamped to the zone's fee bounds
//! - **Budget guard**: reserve-then-commit daily/monthly caps for metered channels,
//!   held in the shared database

pub mod budget;
pub mod pricing;

pub use budget::{BudgetCheck, BudgetGuard, Reservation, check_caps};
pub use pricing::{compute_cost, round6};
