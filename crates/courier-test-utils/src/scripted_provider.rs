// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted provider adapter for deterministic testing.
//!
//! `ScriptedProvider` implements `DeliveryProvider` by popping outcomes from
//! a FIFO queue. When the queue is empty it falls back to a default outcome
//! (delivery at the quoted cost unless changed).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::{DeliveryProvider, DispatchRequest, ProviderError, ProviderReceipt};

/// One scripted provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    /// Synchronous delivery. `None` cost means the quoted cost.
    Deliver { cost: Option<f64> },
    /// Asynchronous acceptance with the given vendor id.
    Accept { provider_request_id: String },
    Transient(String),
    Permanent(String),
    /// Never answer within any realistic attempt timeout.
    Hang,
}

/// A provider adapter that replays a script.
pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Option<Duration>,
    calls: AtomicUsize,
    dispatched: Mutex<Vec<DispatchRequest>>,
}

impl ScriptedProvider {
    /// A provider that delivers every attempt.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Scripted::Deliver { cost: None },
            delay: None,
            calls: AtomicUsize::new(0),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers with `outcomes` in order, then the fallback.
    pub fn with_script(id: &str, outcomes: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from(outcomes)),
            ..Self::new(id)
        }
    }

    /// A provider that fails transiently on every attempt.
    pub fn always_failing(id: &str) -> Self {
        Self {
            fallback: Scripted::Transient(format!("{id} unavailable")),
            ..Self::new(id)
        }
    }

    /// Answer used once the script runs out.
    pub fn or_else(mut self, fallback: Scripted) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push(&self, outcome: Scripted) {
        self.script.lock().await.push_back(outcome);
    }

    /// Number of attempts received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every dispatch received, in order.
    pub async fn dispatched(&self) -> Vec<DispatchRequest> {
        self.dispatched.lock().await.clone()
    }

    async fn next(&self) -> Scripted {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl DeliveryProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn attempt_deliver(
        &self,
        request: &DispatchRequest,
    ) -> Result<ProviderReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dispatched.lock().await.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next().await {
            Scripted::Deliver { cost } => Ok(ProviderReceipt::Delivered {
                provider_request_id: Some(format!("{}-{}", self.id, self.calls())),
                cost,
                detail: "ok".to_string(),
            }),
            Scripted::Accept {
                provider_request_id,
            } => Ok(ProviderReceipt::Accepted {
                provider_request_id,
                detail: "queued".to_string(),
            }),
            Scripted::Transient(message) => Err(ProviderError::Transient(message)),
            Scripted::Permanent(message) => Err(ProviderError::Permanent(message)),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Transient("hung".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Channel;

    fn dispatch() -> DispatchRequest {
        DispatchRequest {
            request_id: "r-1".into(),
            subject_ref: "user-1".into(),
            channel: Channel::Sms,
            zone_code: "WA".into(),
            language: "fr".into(),
            currency: "XOF".into(),
            payload: serde_json::json!({"body": "hi"}),
            quoted_cost: 0.5,
            max_message_seconds: None,
        }
    }

    #[tokio::test]
    async fn script_then_fallback() {
        let provider = ScriptedProvider::with_script(
            "p1",
            vec![
                Scripted::Transient("busy".into()),
                Scripted::Permanent("bad number".into()),
            ],
        );
        assert_eq!(
            provider.attempt_deliver(&dispatch()).await,
            Err(ProviderError::Transient("busy".into()))
        );
        assert_eq!(
            provider.attempt_deliver(&dispatch()).await,
            Err(ProviderError::Permanent("bad number".into()))
        );
        assert!(matches!(
            provider.attempt_deliver(&dispatch()).await,
            Ok(ProviderReceipt::Delivered { cost: None, .. })
        ));
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.dispatched().await.len(), 3);
    }

    #[tokio::test]
    async fn always_failing_keeps_failing() {
        let provider = ScriptedProvider::always_failing("p2");
        for _ in 0..3 {
            assert!(provider.attempt_deliver(&dispatch()).await.is_err());
        }
        provider.push(Scripted::Deliver { cost: Some(0.1) }).await;
        assert!(provider.attempt_deliver(&dispatch()).await.is_ok());
    }
}
