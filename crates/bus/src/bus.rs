use std::collections::HashSet;
use std::sync::Arc;

use rsi_correlator_core::{Event, Topic};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::error::BusError;

/// Default bounded capacity for a subscriber's inbox, per §5's "smaller (1024) for CPU
/// workers" guidance. The Database Manager asks for a larger capacity explicitly.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

struct Subscriber {
    name: String,
    topics: HashSet<Topic>,
    sender: mpsc::Sender<Event>,
}

/// In-process, topic-addressed publish/subscribe broker (C1).
///
/// Delivery is at-most-once within this process. Messages for a given topic arrive at a
/// given subscriber in publish order; no ordering is promised across topics. The bus never
/// invokes a subscriber's handling logic itself — it only forwards into that subscriber's
/// own bounded inbox, so two deliveries to the same subscriber can never run concurrently:
/// that is enforced by the subscriber owning a single receive loop over that inbox (see the
/// `worker` crate).
#[derive(Clone)]
pub struct ServiceBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl Default for ServiceBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a named subscriber for a set of topics, returning its inbox. Safe to call
    /// any time before the subscriber begins reading; the bus has no separate `start` phase.
    pub async fn subscribe(&self, name: impl Into<String>, topics: &[Topic], capacity: usize) -> mpsc::Receiver<Event> {
        let (sender, receiver) = mpsc::channel(capacity);
        let subscriber = Subscriber {
            name: name.into(),
            topics: topics.iter().copied().collect(),
            sender,
        };
        self.subscribers.write().await.push(subscriber);
        receiver
    }

    /// Enqueues `event` to every subscriber registered for its topic. Returns once every
    /// matching subscriber's inbox has accepted the event (possibly after waiting for a full
    /// inbox to drain — the back-pressure behaviour from §5), without waiting for any
    /// subscriber to actually process it.
    pub async fn publish(&self, event: Event) {
        let topic = event.topic();
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.iter().filter(|s| s.topics.contains(&topic)) {
            if subscriber.sender.send(event.clone()).await.is_err() {
                warn!(subscriber = %subscriber.name, ?topic, "subscriber inbox closed, dropping delivery");
            } else {
                debug!(subscriber = %subscriber.name, ?topic, "delivered event");
            }
        }
    }

    /// Validates a JSON payload into an `Event` of the declared `topic` and publishes it.
    /// Payloads that fail schema validation are dropped and logged, never re-queued, per
    /// §4.1 — this mirrors the boundary where an out-of-process producer's raw payload would
    /// be validated.
    ///
    /// # Errors
    ///
    /// Returns `BusError::SchemaInvalid` if `value` does not deserialise into `Event`; the
    /// caller is expected to log and discard rather than retry.
    pub async fn publish_json(&self, topic: Topic, value: serde_json::Value) -> Result<(), BusError> {
        match serde_json::from_value::<Event>(value) {
            Ok(event) => {
                self.publish(event).await;
                Ok(())
            }
            Err(source) => Err(BusError::SchemaInvalid { topic, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_matching_topic() {
        let bus = ServiceBus::new();
        let mut display_rx = bus
            .subscribe("display", &[Topic::FinalResultsReady], DEFAULT_SUBSCRIBER_CAPACITY)
            .await;
        let mut db_rx = bus
            .subscribe("database", &[Topic::RSICalculated], DEFAULT_SUBSCRIBER_CAPACITY)
            .await;

        bus.publish(Event::FinalResultsReady {
            session_guid: "s1".to_string(),
            results: vec![],
        })
        .await;

        let received = display_rx.recv().await.unwrap();
        assert_eq!(received.topic(), Topic::FinalResultsReady);
        assert!(db_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_of_a_topic() {
        let bus = ServiceBus::new();
        let mut rx_a = bus
            .subscribe("a", &[Topic::WorkerFailed], DEFAULT_SUBSCRIBER_CAPACITY)
            .await;
        let mut rx_b = bus
            .subscribe("b", &[Topic::WorkerFailed], DEFAULT_SUBSCRIBER_CAPACITY)
            .await;

        bus.publish(Event::WorkerFailed {
            session_guid: "s1".to_string(),
            worker: "fetcher".to_string(),
            reason: "boom".to_string(),
        })
        .await;

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_json_rejects_malformed_payload() {
        let bus = ServiceBus::new();
        let result = bus
            .publish_json(Topic::DisplayCompleted, serde_json::json!({"not": "valid"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn publish_json_accepts_matching_payload() {
        let bus = ServiceBus::new();
        let mut rx = bus
            .subscribe("sub", &[Topic::DisplayCompleted], DEFAULT_SUBSCRIBER_CAPACITY)
            .await;
        let payload = serde_json::json!({"topic": "DisplayCompleted", "session_guid": "s1"});
        bus.publish_json(Topic::DisplayCompleted, payload).await.unwrap();
        assert!(rx.recv().await.is_some());
    }
}
