// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider catalog lookup with a deterministic total order.

use std::cmp::Ordering;

use courier_core::{Channel, Provider};

/// Who the message is for, as far as provider capability matching goes.
#[derive(Debug, Clone, Copy)]
pub struct SubjectProfile<'a> {
    pub region: Option<&'a str>,
    pub language: &'a str,
}

/// Active providers, ordered for a (channel, zone) pair.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Provider] {
        &self.providers
    }

    /// Active providers serving `channel` in `zone_code` (or globally).
    ///
    /// Order: zone-specific before global; for voice, providers whose
    /// capability covers the subject, then the rule's preferred providers in
    /// listed order; then ascending priority, ascending base cost, and id.
    pub fn select(
        &self,
        channel: Channel,
        zone_code: &str,
        subject: SubjectProfile<'_>,
        preferred: &[String],
    ) -> Vec<Provider> {
        let voice = channel == Channel::Voice;
        let preference_rank = |p: &Provider| {
            preferred
                .iter()
                .position(|id| *id == p.id)
                .unwrap_or(usize::MAX)
        };

        let mut matched: Vec<Provider> = self
            .providers
            .iter()
            .filter(|p| {
                p.active
                    && p.channel == channel
                    && p.zone_code.as_deref().is_none_or(|z| z == zone_code)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            a.zone_code
                .is_none()
                .cmp(&b.zone_code.is_none())
                .then_with(|| {
                    if voice {
                        let covers = |p: &Provider| !p.capability.covers(subject.region, subject.language);
                        covers(a)
                            .cmp(&covers(b))
                            .then_with(|| preference_rank(a).cmp(&preference_rank(b)))
                    } else {
                        Ordering::Equal
                    }
                })
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.base_cost.total_cmp(&b.base_cost))
                .then_with(|| a.id.cmp(&b.id))
        });
        matched
    }
}
