//! Subscription table and per-subscription event streams.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Push notifications delivered to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The server confirmed the subscription. Precedes any message.
    Subscribed,
    /// A message published to a subscribed channel.
    Message {
        /// Channel the message was published to.
        channel: String,
        /// Message payload.
        payload: Bytes,
    },
    /// A message published to a channel matching a subscribed pattern.
    PMessage {
        /// The pattern that matched.
        pattern: String,
        /// Channel the message was published to.
        channel: String,
        /// Message payload.
        payload: Bytes,
    },
    /// The server confirmed the unsubscription. The stream ends after
    /// this event.
    Unsubscribed,
}

/// Whether an entry subscribes a channel or a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionKind {
    Channel,
    Pattern,
}

/// Handle to one channel or pattern subscription.
///
/// Events arrive in order: `Subscribed`, then any number of messages,
/// then `Unsubscribed`. The stream ends (yields `None`) after the
/// unsubscription is confirmed, or when the connection is re-established
/// and all subscriptions are dropped.
pub struct Subscription {
    key: String,
    events: mpsc::UnboundedReceiver<PushEvent>,
}

impl Subscription {
    pub(crate) fn new(key: String, events: mpsc::UnboundedReceiver<PushEvent>) -> Self {
        Self { key, events }
    }

    /// The channel or pattern this subscription was registered for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next push event.
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

struct Entry {
    kind: SubscriptionKind,
    events: mpsc::UnboundedSender<PushEvent>,
}

/// Mapping from channel-or-pattern key to its subscription stream.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: HashMap<String, Entry>,
}

impl SubscriptionTable {
    /// Register a new subscription. Fails when the key is already taken.
    pub(crate) fn insert(
        &mut self,
        key: &str,
        kind: SubscriptionKind,
    ) -> Result<mpsc::UnboundedReceiver<PushEvent>> {
        if self.entries.contains_key(key) {
            return Err(Error::SubscriptionAlreadyExists(key.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.insert(key.to_string(), Entry { kind, events: tx });
        Ok(rx)
    }

    /// Check that an entry of the given kind exists, for unsubscription.
    pub(crate) fn expect(&self, key: &str, kind: SubscriptionKind) -> Result<()> {
        match self.entries.get(key) {
            Some(entry) if entry.kind == kind => Ok(()),
            _ => Err(Error::SubscriptionDoesNotExist(key.to_string())),
        }
    }

    /// Deliver an event to the subscription for `key`. Returns false when
    /// no such subscription exists.
    pub(crate) fn deliver(&self, key: &str, event: PushEvent) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                let _ = entry.events.send(event);
                true
            }
            None => false,
        }
    }

    /// Deliver `Unsubscribed` and remove the entry, ending its stream.
    pub(crate) fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                let _ = entry.events.send(PushEvent::Unsubscribed);
                true
            }
            None => false,
        }
    }

    /// Drop every entry, ending all streams. Done on each successful
    /// connect: server-side subscription state did not survive the old
    /// socket.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pub/sub mode is active exactly while something is subscribed.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
