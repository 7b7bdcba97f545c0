// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family.

pub mod audit;
pub mod budget;
pub mod catalog;
pub mod metrics;
pub mod requests;
