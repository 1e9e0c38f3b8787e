//! Push Bus (spec §4.H): fans out score/status updates to WebSocket
//! subscribers. Each subscriber has an independent FIFO; a slow subscriber
//! drops its oldest unread messages rather than blocking publishers or other
//! subscribers. This is exactly `tokio::sync::broadcast`'s ring-buffer/lag
//! behavior, the same primitive the teacher backend uses for its own
//! WebSocket fan-out (`main.rs`'s `signal_tx: broadcast::Sender<WsServerEvent>`).

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{Band, Status};

/// One push event, matching the `ScoreUpdate` / `StatusUpdate` topics (spec
/// §4.A).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum PushEvent {
    ScoreUpdate {
        analysis_id: Uuid,
        authenticity: u8,
        bot: f64,
        band: Band,
        completed_at: chrono::DateTime<chrono::Utc>,
    },
    StatusUpdate {
        analysis_id: Uuid,
        status: Status,
    },
    ShameAdd {
        analysis_id: Uuid,
        product_name: String,
        band: Band,
    },
}

/// Wraps a broadcast channel sized by `push.subscriberCap` (spec §6). A new
/// subscriber only sees events published after it subscribes.
#[derive(Clone)]
pub struct PushBus {
    tx: broadcast::Sender<PushEvent>,
}

impl PushBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PushEvent) {
        // No receivers is not an error: nobody's listening yet.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }
}

/// Filter a subscriber's receiver down to events for one `analysis_id`,
/// surfacing `Lagged` counts to the caller so the WebSocket handler can log
/// them (spec §4.H "increments a lag counter visible in logs/metrics").
pub async fn recv_filtered(
    rx: &mut broadcast::Receiver<PushEvent>,
    analysis_id: Uuid,
) -> Option<PushEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if matches_analysis(&event, analysis_id) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(%analysis_id, skipped, "push subscriber lagged, dropped events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn matches_analysis(event: &PushEvent, analysis_id: Uuid) -> bool {
    match event {
        PushEvent::ScoreUpdate { analysis_id: id, .. } => *id == analysis_id,
        PushEvent::StatusUpdate { analysis_id: id, .. } => *id == analysis_id,
        PushEvent::ShameAdd { analysis_id: id, .. } => *id == analysis_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = PushBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(PushEvent::StatusUpdate {
            analysis_id: id,
            status: Status::Processing,
        });
        let event = recv_filtered(&mut rx, id).await.unwrap();
        assert!(matches!(event, PushEvent::StatusUpdate { .. }));
    }

    #[tokio::test]
    async fn filters_out_other_analyses() {
        let bus = PushBus::new(16);
        let mut rx = bus.subscribe();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        bus.publish(PushEvent::StatusUpdate {
            analysis_id: other,
            status: Status::Processing,
        });
        bus.publish(PushEvent::StatusUpdate {
            analysis_id: mine,
            status: Status::Complete,
        });
        let event = recv_filtered(&mut rx, mine).await.unwrap();
        assert!(matches!(
            event,
            PushEvent::StatusUpdate {
                status: Status::Complete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_without_blocking() {
        let bus = PushBus::new(2);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        for _ in 0..10 {
            bus.publish(PushEvent::StatusUpdate {
                analysis_id: id,
                status: Status::Processing,
            });
        }
        // Should still get a (later) event rather than hang or error out.
        let event = recv_filtered(&mut rx, id).await;
        assert!(event.is_some());
    }
}
