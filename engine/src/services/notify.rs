use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::metrics::LIVE_SUBSCRIBERS_ACTIVE;
use crate::models::{LeaderboardKind, RankedEntry};

/// Depth of each subscriber's outbound queue. A subscriber that falls this
/// far behind is dropped instead of slowing down the publisher.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Connected {
        observer_id: String,
    },
    Leaderboard {
        kind: LeaderboardKind,
        entries: Vec<RankedEntry>,
    },
}

/// Fan-out of leaderboard deltas to connected live observers.
///
/// Delivery is at-most-once and best-effort: there is no replay buffer, and an
/// observer that connects after a broadcast simply misses it (acceptable,
/// since leaderboard reads pull a full snapshot on connect). Broadcast is
/// non-blocking per subscriber via `try_send`; a full or closed queue evicts
/// that subscriber and never delays the others.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: RwLock<HashMap<String, mpsc::Sender<LiveEvent>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer and immediately queues its connected event.
    /// Re-subscribing under the same id replaces the previous channel.
    pub fn subscribe(&self, observer_id: &str) -> mpsc::Receiver<LiveEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);

        // Queue is freshly created, so this send cannot fail.
        let _ = tx.try_send(LiveEvent::Connected {
            observer_id: observer_id.to_string(),
        });

        let replaced = self
            .subscribers
            .write()
            .unwrap()
            .insert(observer_id.to_string(), tx);
        if replaced.is_none() {
            LIVE_SUBSCRIBERS_ACTIVE.inc();
        }

        tracing::info!("Live observer connected: {}", observer_id);
        rx
    }

    /// Idempotent; removing an unknown observer is a no-op.
    pub fn unsubscribe(&self, observer_id: &str) {
        if self
            .subscribers
            .write()
            .unwrap()
            .remove(observer_id)
            .is_some()
        {
            LIVE_SUBSCRIBERS_ACTIVE.dec();
            tracing::info!("Live observer disconnected: {}", observer_id);
        }
    }

    pub fn broadcast(&self, event: LiveEvent) {
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap();
            for (observer_id, tx) in subscribers.iter() {
                if tx.try_send(event.clone()).is_err() {
                    dead.push(observer_id.clone());
                }
            }
        }

        if dead.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.write().unwrap();
        for observer_id in dead {
            if subscribers.remove(&observer_id).is_some() {
                LIVE_SUBSCRIBERS_ACTIVE.dec();
                tracing::warn!("Dropping unresponsive live observer: {}", observer_id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// Graceful drain on shutdown: closes every subscriber channel.
    pub fn drain(&self) {
        let mut subscribers = self.subscribers.write().unwrap();
        LIVE_SUBSCRIBERS_ACTIVE.sub(subscribers.len() as i64);
        subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaderboard_event() -> LiveEvent {
        LiveEvent::Leaderboard {
            kind: LeaderboardKind::Score,
            entries: vec![RankedEntry {
                rank: 1,
                user_id: "user-1".to_string(),
                username: "alice".to_string(),
                value: 100,
            }],
        }
    }

    #[tokio::test]
    async fn subscribe_emits_connected_event() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe("observer-1");

        match rx.recv().await.unwrap() {
            LiveEvent::Connected { observer_id } => assert_eq!(observer_id, "observer-1"),
            other => panic!("expected connected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let hub = NotificationHub::new();
        let mut rx1 = hub.subscribe("observer-1");
        let mut rx2 = hub.subscribe("observer-2");

        // Drain the connected events first.
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();

        hub.broadcast(leaderboard_event());

        assert!(matches!(
            rx1.recv().await.unwrap(),
            LiveEvent::Leaderboard { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            LiveEvent::Leaderboard { .. }
        ));
    }

    #[tokio::test]
    async fn full_queue_drops_only_the_slow_subscriber() {
        let hub = NotificationHub::new();
        let _stuck = hub.subscribe("slow"); // receiver never drained
        let mut rx = hub.subscribe("healthy");
        rx.recv().await.unwrap();

        // Overflow the slow subscriber's queue (one slot already holds its
        // connected event); the healthy one has exactly enough room.
        for _ in 0..SUBSCRIBER_QUEUE_DEPTH {
            hub.broadcast(leaderboard_event());
        }

        assert_eq!(hub.subscriber_count(), 1);
        // The healthy subscriber still got everything up to its queue depth.
        assert!(matches!(
            rx.recv().await.unwrap(),
            LiveEvent::Leaderboard { .. }
        ));
    }

    #[tokio::test]
    async fn dropped_receiver_is_evicted_on_next_broadcast() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe("gone");
        drop(rx);

        hub.broadcast(leaderboard_event());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let hub = NotificationHub::new();
        hub.subscribe("observer-1");

        hub.unsubscribe("observer-1");
        hub.unsubscribe("observer-1");
        hub.unsubscribe("never-subscribed");
        assert_eq!(hub.subscriber_count(), 0);
    }
}
