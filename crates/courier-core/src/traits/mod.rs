// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits implemented at the engine's seams.

pub mod clock;
pub mod provider;

pub use clock::{Clock, SystemClock};
pub use provider::{DeliveryProvider, DispatchRequest, ProviderReceipt};
