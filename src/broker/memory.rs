//! `MemoryBroker`: an in-process fake broker for tests and demo mode (spec
//! explicitly allows substituting in-memory fakes for agents/broker in
//! demo mode). Delivers published messages directly to matching
//! subscribers, with the same `+` single-segment wildcard grammar as the
//! Topic Router (spec §4.A).

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::BrokerError;

use super::{Broker, BrokerMessage};

struct Subscription {
    pattern: Vec<String>,
    tx: mpsc::Sender<BrokerMessage>,
}

#[derive(Default)]
pub struct MemoryBroker {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(pattern: &[String], topic: &str) -> bool {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() != pattern.len() {
        return false;
    }
    pattern
        .iter()
        .zip(parts.iter())
        .all(|(p, t)| p == "+" || p == t)
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let subs = self.subscriptions.lock();
        for sub in subs.iter() {
            if matches(&sub.pattern, topic) {
                let message = BrokerMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                // Best-effort: a full channel here means the test/demo
                // consumer isn't keeping up, which is a test bug, not a
                // production backpressure condition.
                let _ = sub.tx.try_send(message);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError> {
        let (tx, rx) = mpsc::channel(1024);
        let pattern = pattern.split('/').map(str::to_string).collect();
        self.subscriptions.lock().push(Subscription { pattern, tx });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.subscriptions.lock().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_wildcard_subscriber() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe("signalzero/agent/+/response").await.unwrap();
        broker
            .publish("signalzero/agent/bot/response", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "signalzero/agent/bot/response");
    }

    #[tokio::test]
    async fn does_not_deliver_to_non_matching_subscriber() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe("signalzero/agent/bot/request").await.unwrap();
        broker
            .publish("signalzero/agent/trend/request", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
