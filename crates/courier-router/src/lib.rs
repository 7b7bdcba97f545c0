// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel routing and provider selection.
//!
//! Resolution order for one request: quiet hours, routing rule (or default
//! order), user opt-outs, voice rule filter, zone channel flags. Provider
//! ordering for each surviving channel comes from [`ProviderRegistry`].

pub mod quiet_hours;
pub mod routing;
pub mod selection;
pub mod voice;

pub use quiet_hours::{quiet_window_end, subject_timezone};
pub use routing::{RoutingDecision, RoutingQuery, RoutingResolver, RoutingTable, filter_zone_channels};
pub use selection::{ProviderRegistry, SubjectProfile};
pub use voice::{VoiceFilter, VoiceRuleTable, filter_voice};
