//! In-process adapter for the realtime change feed.
//!
//! The feed contract is table-scoped, payload-free notifications with
//! unsubscribe-on-drop. This adapter is a per-table broadcast hub: whatever
//! integrates the backend (a write path, a websocket bridge) calls
//! [`BroadcastChangeFeed::notify`] and every live subscription for that
//! table wakes up.

use crate::domain::{ChangeFeed, ChangeNotification, FeedSubscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

pub struct BroadcastChangeFeed {
    channels: RwLock<HashMap<String, broadcast::Sender<ChangeNotification>>>,
    capacity: usize,
}

impl BroadcastChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn sender_for(&self, table: &str) -> broadcast::Sender<ChangeNotification> {
        if let Some(tx) = self.channels.read().expect("feed lock poisoned").get(table) {
            return tx.clone();
        }
        let mut channels = self.channels.write().expect("feed lock poisoned");
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Signal that a row in `table` changed. Subscribers receive no payload.
    pub fn notify(&self, table: &str) {
        let _ = self.sender_for(table).send(ChangeNotification);
    }
}

impl Default for BroadcastChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl ChangeFeed for BroadcastChangeFeed {
    async fn subscribe(&self, table: &str) -> Box<dyn FeedSubscription> {
        Box::new(BroadcastSubscription {
            rx: self.sender_for(table).subscribe(),
        })
    }
}

struct BroadcastSubscription {
    rx: broadcast::Receiver<ChangeNotification>,
}

#[async_trait]
impl FeedSubscription for BroadcastSubscription {
    async fn next(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) => return Some(notification),
                // A lagged receiver collapses missed notifications into the
                // next one; the consumer re-fetches everything anyway.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notification_reaches_subscriber() {
        let feed = BroadcastChangeFeed::new(8);
        let mut sub = feed.subscribe("snaps").await;
        feed.notify("snaps");
        assert_eq!(sub.next().await, Some(ChangeNotification));
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let feed = BroadcastChangeFeed::new(8);
        let mut snaps = feed.subscribe("snaps").await;
        let mut comments = feed.subscribe("comments").await;
        feed.notify("comments");
        assert_eq!(comments.next().await, Some(ChangeNotification));
        // The snaps subscription saw nothing.
        feed.notify("snaps");
        assert_eq!(snaps.next().await, Some(ChangeNotification));
    }

    #[tokio::test]
    async fn subscription_closes_when_feed_drops() {
        let feed = BroadcastChangeFeed::new(8);
        let mut sub = feed.subscribe("snaps").await;
        drop(feed);
        assert_eq!(sub.next().await, None);
    }
}
