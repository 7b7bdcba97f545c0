// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel routing: (country, event type, preferences, quiet hours) to an
//! ordered channel list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use courier_core::types::ANY;
use courier_core::{Channel, CourierError, DeliveryRequest, Priority, UserPreferences, ZonePolicy};
use tracing::debug;

use crate::quiet_hours::{quiet_window_end, subject_timezone};

/// Routing rules indexed by `(country, event_type)`. Either key may be `*`.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: HashMap<(String, String), courier_core::RoutingRule>,
}

impl RoutingTable {
    pub fn new(rules: impl IntoIterator<Item = courier_core::RoutingRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|r| ((r.country.to_uppercase(), r.event_type.clone()), r))
                .collect(),
        }
    }

    /// Most specific rule: exact pair, then country wildcard event, then
    /// wildcard country, then the global `(*, *)` rule.
    pub fn lookup(&self, country: &str, event_type: &str) -> Option<&courier_core::RoutingRule> {
        let country = country.to_uppercase();
        [
            (country.as_str(), event_type),
            (country.as_str(), ANY),
            (ANY, event_type),
            (ANY, ANY),
        ]
        .into_iter()
        .find_map(|(c, e)| self.rules.get(&(c.to_string(), e.to_string())))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The routing inputs of one request.
#[derive(Debug, Clone, Copy)]
pub struct RoutingQuery<'a> {
    pub event_type: &'a str,
    pub country: &'a str,
    pub region: Option<&'a str>,
    pub city: Option<&'a str>,
    /// Channel named by the producer; leads the default order.
    pub requested: Channel,
    pub priority: Priority,
    pub preferences: &'a UserPreferences,
}

impl<'a> From<&'a DeliveryRequest> for RoutingQuery<'a> {
    fn from(request: &'a DeliveryRequest) -> Self {
        Self {
            event_type: &request.event_type,
            country: &request.country,
            region: request.region.as_deref(),
            city: request.city.as_deref(),
            requested: request.channel,
            priority: request.priority,
            preferences: &request.preferences,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Ordered, non-empty candidate channels.
    Route(Vec<Channel>),
    /// Inside the subject's quiet hours; try again at `until`.
    Defer { until: DateTime<Utc> },
}

/// Resolves candidate channels for a request.
#[derive(Debug, Clone)]
pub struct RoutingResolver {
    default_channels: Vec<Channel>,
    urgent_priority: Priority,
}

impl RoutingResolver {
    pub fn new(default_channels: Vec<Channel>, urgent_priority: Priority) -> Self {
        Self {
            default_channels,
            urgent_priority,
        }
    }

    pub fn resolve(
        &self,
        table: &RoutingTable,
        query: RoutingQuery<'_>,
        now: DateTime<Utc>,
    ) -> Result<RoutingDecision, CourierError> {
        if query.priority < self.urgent_priority
            && let Some(quiet) = &query.preferences.quiet_hours
        {
            let tz = subject_timezone(query.preferences);
            if let Some(until) = quiet_window_end(quiet, tz, now) {
                debug!(%until, priority = %query.priority, "inside quiet hours, deferring");
                return Ok(RoutingDecision::Defer { until });
            }
        }

        let nominated: Vec<Channel> = match table.lookup(query.country, query.event_type) {
            Some(rule) => {
                debug!(
                    country = rule.country.as_str(),
                    event_type = rule.event_type.as_str(),
                    primary = %rule.primary_channel,
                    "routing rule matched"
                );
                std::iter::once(rule.primary_channel)
                    .chain(rule.fallback_channel)
                    .collect()
            }
            None => std::iter::once(query.requested)
                .chain(self.default_channels.iter().copied())
                .collect(),
        };

        let mut channels = Vec::with_capacity(nominated.len());
        for channel in nominated {
            if !channels.contains(&channel) && query.preferences.allows(channel) {
                channels.push(channel);
            }
        }

        if channels.is_empty() {
            return Err(CourierError::NoEligibleChannel {
                reason: "every candidate channel is disabled in user preferences".to_string(),
            });
        }
        Ok(RoutingDecision::Route(channels))
    }
}

/// Drop channels the zone policy switches off.
pub fn filter_zone_channels(channels: Vec<Channel>, zone: &ZonePolicy) -> Vec<Channel> {
    channels
        .into_iter()
        .filter(|c| zone.channels.allows(*c))
        .collect()
}
