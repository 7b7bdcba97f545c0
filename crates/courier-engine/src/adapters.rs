// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter bindings: catalog provider id to the code that talks to it.

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::DeliveryProvider;
use tracing::debug;

/// Provider adapters keyed by catalog provider id.
#[derive(Clone, Default)]
pub struct ProviderAdapters {
    adapters: HashMap<String, Arc<dyn DeliveryProvider>>,
}

impl ProviderAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an adapter under its own provider id, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn DeliveryProvider>) {
        let id = adapter.provider_id().to_string();
        debug!(provider_id = id.as_str(), "provider adapter registered");
        self.adapters.insert(id, adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn DeliveryProvider>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn DeliveryProvider>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.adapters.keys().collect();
        ids.sort();
        f.debug_struct("ProviderAdapters").field("ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::{DispatchRequest, ProviderError, ProviderReceipt};

    struct Echo(&'static str);

    #[async_trait]
    impl DeliveryProvider for Echo {
        fn provider_id(&self) -> &str {
            self.0
        }

        async fn attempt_deliver(
            &self,
            _request: &DispatchRequest,
        ) -> Result<ProviderReceipt, ProviderError> {
            Err(ProviderError::Transient("unused".into()))
        }
    }

    #[test]
    fn adapters_are_looked_up_by_provider_id() {
        let adapters = ProviderAdapters::new()
            .with(Arc::new(Echo("p1")))
            .with(Arc::new(Echo("p2")));
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters.get("p2").unwrap().provider_id(), "p2");
        assert!(adapters.get("p3").is_none());
    }
}
