// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Geography-scoped voice policy and the voice veto filter.

use std::collections::HashMap;

use courier_core::{Channel, GeographyKey, VoiceRule};
use tracing::debug;

/// Voice rules indexed by geography key.
#[derive(Debug, Clone, Default)]
pub struct VoiceRuleTable {
    rules: HashMap<GeographyKey, VoiceRule>,
}

impl VoiceRuleTable {
    pub fn new(rules: impl IntoIterator<Item = VoiceRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.geography.clone(), r)).collect(),
        }
    }

    /// Resolve with precedence city > country > region > default.
    ///
    /// A stored `default` rule replaces the built-in default.
    pub fn resolve_rule(&self, country: &str, region: Option<&str>, city: Option<&str>) -> VoiceRule {
        let country = country.to_uppercase();
        let mut candidates = Vec::with_capacity(4);
        if let Some(city) = city {
            candidates.push(GeographyKey::City {
                country: country.clone(),
                city: city.to_string(),
            });
        }
        candidates.push(GeographyKey::Country(country));
        if let Some(region) = region {
            candidates.push(GeographyKey::Region(region.to_string()));
        }
        candidates.push(GeographyKey::Default);

        candidates
            .iter()
            .find_map(|key| self.rules.get(key))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Channels left after the voice filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFilter {
    pub channels: Vec<Channel>,
    /// Why voice was removed, if it was a candidate and got vetoed.
    pub vetoed: Option<String>,
}

/// Remove voice when the resolved rule forbids it. Other channels keep their
/// order, so the next non-voice candidate moves up.
pub fn filter_voice(channels: Vec<Channel>, rule: &VoiceRule, local_hour: u32) -> VoiceFilter {
    if !channels.contains(&Channel::Voice) {
        return VoiceFilter {
            channels,
            vetoed: None,
        };
    }

    let reason = if !rule.fallback_enabled {
        Some(format!("voice disabled by rule {}", rule.geography))
    } else if let Some(window) = rule.allowed_hours
        && !window.contains(local_hour)
    {
        Some(format!(
            "hour {local_hour} outside voice window {}-{} of rule {}",
            window.start_hour, window.end_hour, rule.geography
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => {
            debug!(reason = reason.as_str(), "voice vetoed");
            VoiceFilter {
                channels: channels.into_iter().filter(|c| *c != Channel::Voice).collect(),
                vetoed: Some(reason),
            }
        }
        None => VoiceFilter {
            channels,
            vetoed: None,
        },
    }
}
