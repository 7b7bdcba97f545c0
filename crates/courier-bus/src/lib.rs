// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal typed event bus for Courier.
//!
//! Terminal delivery results are published here once their transition has
//! committed. Subscribers (relays to an external broker, operator tooling,
//! tests) each get every event through a `tokio::sync::broadcast` channel.

pub mod events;

use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use events::{DeliveryEvent, DeliveryEventKind};

/// Default channel capacity. Slow subscribers that fall further behind than
/// this lose the oldest events and see `RecvError::Lagged`.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out publisher for [`DeliveryEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeliveryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it.
    ///
    /// Publishing with no subscribers is not an error; the event is logged
    /// and dropped.
    pub fn publish(&self, event: DeliveryEvent) -> usize {
        let request_id = event.request_id.clone();
        let kind = event.kind;
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(request_id = request_id.as_str(), %kind, receivers, "delivery event published");
                receivers
            }
            Err(_) => {
                warn!(request_id = request_id.as_str(), %kind, "delivery event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::DeliveryStatus;
    use tracing_test::traced_test;

    fn event(request_id: &str) -> DeliveryEvent {
        DeliveryEvent {
            event_id: format!("evt-{request_id}"),
            kind: DeliveryEventKind::Delivered,
            request_id: request_id.into(),
            subject_ref: "user-1".into(),
            event_type: "otp".into(),
            zone_code: "WA".into(),
            status: DeliveryStatus::Delivered,
            failure_reason: None,
            attempts: vec![],
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(event("r1")), 2);
        assert_eq!(a.recv().await.unwrap().request_id, "r1");
        assert_eq!(b.recv().await.unwrap().request_id, "r1");
    }

    #[test]
    #[traced_test]
    fn publish_without_subscribers_drops() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(event("r2")), 0);
        assert!(logs_contain("no subscribers"));
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..4 {
            bus.publish(event(&format!("r{i}")));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().request_id, "r2");
    }
}
