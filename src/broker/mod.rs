//! Broker Client (spec §4.B): the transport between this service and the
//! detection agents. Abstracted behind a trait so the orchestrator never
//! depends on a concrete transport — `NatsBroker` talks to a real broker,
//! `MemoryBroker` is an in-process fake for tests and demo mode (spec's
//! explicit "substitute in-memory fakes" instruction).

pub mod memory;
pub mod nats;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::BrokerError;

pub use memory::MemoryBroker;
pub use nats::NatsBroker;

/// An inbound message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish to `topic`. Returns `BrokerError::Backpressure` if the
    /// outbound buffer is at `broker.outboundCap` (spec §4.B, §7).
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Subscribe to a topic pattern (MQTT-style `+` wildcard, spec §4.A),
    /// returning a channel of delivered messages.
    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError>;

    /// Gracefully close the connection, used during shutdown drain (spec §6
    /// `shutdown.drainBudgetMs`).
    async fn close(&self) -> Result<(), BrokerError>;

    /// Whether the transport currently believes it's connected, surfaced at
    /// `/ready` so operators can see the `healthGrace` window the
    /// Orchestrator relies on (spec §4.F).
    fn is_connected(&self) -> bool;
}
