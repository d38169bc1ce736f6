//! Change propagation: payload-less invalidation signals fanned out per (table, status) topic.
//!
//! Delivery is at-most-once. A lagged receiver or a transport reconnect yields
//! [`ChangeSignal::Resync`], telling the consumer that notifications may have been missed and a
//! full re-fetch is required.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::store::Table;

/// A watched slice: every row of `table`, or only rows whose status label is `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub table: Table,
    pub status: Option<&'static str>,
}

impl Topic {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            status: None,
        }
    }

    pub fn slice(table: Table, status: &'static str) -> Self {
        Self {
            table,
            status: Some(status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Describes a committed mutation. Consumers must not rely on it beyond "something changed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub previous_status: Option<&'static str>,
    pub current_status: Option<&'static str>,
}

impl ChangeEvent {
    pub fn inserted(table: Table, status: Option<&'static str>) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            previous_status: None,
            current_status: status,
        }
    }

    pub fn updated(table: Table, previous: &'static str, current: &'static str) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            previous_status: Some(previous),
            current_status: Some(current),
        }
    }

    pub fn deleted(table: Table, status: Option<&'static str>) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            previous_status: status,
            current_status: None,
        }
    }

    /// Every topic that must hear about this event.
    fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::table(self.table)];
        for status in [self.current_status, self.previous_status].into_iter().flatten() {
            let topic = Topic::slice(self.table, status);
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        topics
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    Changed(ChangeEvent),
    /// Notifications may have been lost; re-fetch unconditionally.
    Resync,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    channels: Arc<RwLock<HashMap<Topic, broadcast::Sender<ChangeSignal>>>>,
    capacity: usize,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let receiver = channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        debug!(table = topic.table.label(), status = ?topic.status, "subscription opened");

        Subscription {
            topic,
            receiver: Some(receiver),
        }
    }

    /// Fan an event out to the table-wide topic and to the old and new status slices.
    pub fn publish(&self, event: ChangeEvent) {
        let senders: Vec<(Topic, broadcast::Sender<ChangeSignal>)> = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            event
                .topics()
                .into_iter()
                .filter_map(|topic| channels.get(&topic).map(|tx| (topic, tx.clone())))
                .collect()
        };

        for (topic, tx) in senders {
            // Err only means nobody is listening right now.
            let delivered = tx.send(ChangeSignal::Changed(event.clone())).unwrap_or(0);
            debug!(
                table = topic.table.label(),
                status = ?topic.status,
                kind = ?event.kind,
                delivered,
                "change published"
            );
        }
    }

    /// Called by the transport after it re-establishes a dropped connection.
    pub fn announce_reconnect(&self) {
        let senders: Vec<broadcast::Sender<ChangeSignal>> = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            channels.values().cloned().collect()
        };
        for tx in senders {
            let _ = tx.send(ChangeSignal::Resync);
        }
        debug!("resync announced to all topics");
    }

    /// Open subscriptions on `topic`; zero once every owning view has unmounted.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(topic)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

/// Disposable subscription handle. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    receiver: Option<broadcast::Receiver<ChangeSignal>>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next signal; `None` once closed or once the feed itself is gone.
    pub async fn next_signal(&mut self) -> Option<ChangeSignal> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Ok(signal) => Some(signal),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, table = self.topic.table.label(), "subscriber lagged");
                Some(ChangeSignal::Resync)
            }
            Err(RecvError::Closed) => {
                self.receiver = None;
                None
            }
        }
    }

    pub fn close(&mut self) {
        if self.receiver.take().is_some() {
            debug!(
                table = self.topic.table.label(),
                status = ?self.topic.status,
                "subscription closed"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
