//! `NatsBroker`: the production `Broker` implementation over `async-nats`.
//!
//! Reconnection uses exponential backoff with jitter (spec §4.B), the same
//! shape as a retry/backoff loop, grounded on the teacher's WebSocket
//! reconnect handling — generalized here to the broker transport. Outbound
//! publishes are bounded by a semaphore sized to `broker.outboundCap`; when
//! the buffer is full, `publish` fails fast with `BrokerError::Backpressure`
//! rather than queuing unboundedly (spec §4.B, §7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};

use crate::config::BackoffConfig;
use crate::error::BrokerError;
use crate::topics::Topic;

use super::{Broker, BrokerMessage};

pub struct NatsBroker {
    client: Client,
    outbound_permits: Arc<Semaphore>,
    connected: Arc<AtomicBool>,
}

impl NatsBroker {
    /// Connect with exponential backoff (spec §4.B: base/cap/jitter from
    /// `BackoffConfig`). Gives up only when `max_attempts` is exhausted;
    /// callers pass a generous bound at startup and a small one for
    /// best-effort reconnects.
    pub async fn connect(
        url: &str,
        outbound_cap: usize,
        backoff: BackoffConfig,
        max_attempts: u32,
    ) -> Result<Self, BrokerError> {
        let mut attempt = 0u32;
        loop {
            // `reconnect_delay_callback` governs both this initial-connect
            // retry loop and every reconnect `async-nats` performs on its
            // own after a later drop, so `broker.reconnectBackoff` (spec
            // §4.B) applies uniformly across the connection's lifetime.
            let opts = async_nats::ConnectOptions::new()
                .reconnect_delay_callback(move |attempts| backoff_delay(&backoff, attempts as u32));
            match async_nats::connect_with_options(url, opts).await {
                Ok(client) => {
                    return Ok(Self {
                        client,
                        outbound_permits: Arc::new(Semaphore::new(outbound_cap)),
                        connected: Arc::new(AtomicBool::new(true)),
                    })
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(BrokerError::Transport(e.to_string()));
                    }
                    let delay = backoff_delay(&backoff, attempt);
                    tracing::warn!(attempt, ?delay, error = %e, "nats connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

}

/// Exponential backoff with a cap and +/- jitter (spec §4.B
/// `reconnectBackoff`).
fn backoff_delay(cfg: &BackoffConfig, attempt: u32) -> Duration {
    let exp = cfg.base.as_millis().saturating_mul(1u128 << attempt.min(20));
    let capped = exp.min(cfg.cap.as_millis());
    let jitter_range = (capped as f64 * cfg.jitter_pct) as i64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(-jitter_range..=jitter_range)
    } else {
        0
    };
    let millis = (capped as i64 + jitter).max(0) as u64;
    Duration::from_millis(millis)
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let permit = self
            .outbound_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| BrokerError::Backpressure)?;

        let subject = Topic::to_subject(topic);
        let result = self
            .client
            .publish(subject, payload)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()));
        drop(permit);
        result
    }

    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<BrokerMessage>, BrokerError> {
        let subject = Topic::to_subject(pattern);
        let mut subscriber = self
            .client
            .subscribe(subject)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let msg = BrokerMessage {
                    topic: message.subject.to_string().replace('.', "/").replace('*', "+"),
                    payload: message.payload,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::Relaxed);
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
            && self.client.connection_state() == async_nats::connection::State::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_respects_cap() {
        let cfg = BackoffConfig::default();
        for attempt in 0..30 {
            let delay = backoff_delay(&cfg, attempt);
            let max_with_jitter =
                cfg.cap.as_millis() as u64 + (cfg.cap.as_millis() as f64 * cfg.jitter_pct) as u64;
            assert!(delay.as_millis() as u64 <= max_with_jitter);
        }
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let cfg = BackoffConfig::default();
        let d0 = backoff_delay(&cfg, 0).as_millis();
        let d3 = backoff_delay(&cfg, 3).as_millis();
        assert!(d3 >= d0);
    }
}
