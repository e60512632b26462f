//! RESP command connection.
//!
//! A [`Connection`] layers request/reply correlation and pub/sub dispatch
//! on top of a [`Transport`] framed with the RESP codec. Commands go out
//! as RESP arrays of bulk strings; each accepted command takes one slot in
//! a FIFO pending queue and resolves with the matching server reply.
//! While anything is subscribed, unsolicited push arrays are intercepted
//! and routed to the per-key subscription streams instead.

mod subscription;

pub use subscription::{PushEvent, Subscription};

use crate::error::{Error, Result};
use crate::protocol::{encode_command, Reply, RespCodec};
use crate::transport::{Transport, TransportEvent, TransportOptions};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use subscription::{SubscriptionKind, SubscriptionTable};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

/// Error-reply payload used when a pending request is aborted by a
/// transport loss.
pub const ERROR_TCP_DISCONNECTED: &str = "TCP DISCONNECTED";

/// Error-reply payload used when a command is issued while the transport
/// is not connected.
pub const ERROR_TCP_CANNOT_SEND_MESSAGE: &str = "TCP CANNOT SEND MESSAGE";

/// Connection lifecycle notifications.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A connect attempt succeeded. Any previous subscriptions are gone.
    Connected,
    /// A connect attempt failed; the retry policy decides what follows.
    ConnectFailed(Error),
    /// An established session was lost. All requests pending at the time
    /// of the loss have already been resolved with
    /// [`ERROR_TCP_DISCONNECTED`].
    Disconnected(Error),
}

/// One slot in the pending queue: what to do with the next reply.
enum Pending {
    /// An ordinary request; the reply resolves the caller's future.
    Request(oneshot::Sender<Reply>),
    /// A subscribe command; the confirmation is routed to the
    /// subscription table instead of a caller.
    Subscribe,
}

struct Shared {
    pending: Mutex<VecDeque<Pending>>,
    subscriptions: Mutex<SubscriptionTable>,
}

impl Shared {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            subscriptions: Mutex::new(SubscriptionTable::default()),
        }
    }

    /// Resolve every pending request with an error reply, in FIFO order.
    fn drain_pending(&self, message: &str) {
        let drained: Vec<Pending> = self.pending.lock().drain(..).collect();
        for slot in drained {
            if let Pending::Request(tx) = slot {
                let _ = tx.send(Reply::error(message));
            }
        }
    }
}

/// An auto-reconnecting connection to a RESP server.
///
/// Cheap to clone; all clones share one transport and one pending queue.
#[derive(Clone)]
pub struct Connection {
    transport: Transport,
    shared: Arc<Shared>,
}

impl Connection {
    /// Connect to the configured endpoint and spawn the reply dispatcher.
    ///
    /// Returns the connection handle and its lifecycle event channel. The
    /// channel closes once the connection has fully quiesced after
    /// [`disconnect`](Self::disconnect).
    pub fn connect(
        options: TransportOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (transport, transport_events) = Transport::connect(options, RespCodec::new());
        let shared = Arc::new(Shared::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(
            transport_events,
            transport.clone(),
            Arc::clone(&shared),
            events_tx,
        ));

        (Self { transport, shared }, events_rx)
    }

    /// Issue a command and resolve with its reply.
    ///
    /// Failures surface as `Reply::Error`: [`ERROR_TCP_CANNOT_SEND_MESSAGE`]
    /// when the transport is down at submission, the send-queue failure
    /// text when the byte cap is hit, and [`ERROR_TCP_DISCONNECTED`] when
    /// the transport is lost while the request is in flight.
    pub async fn execute<A: AsRef<[u8]>>(&self, args: &[A]) -> Reply {
        if !self.transport.connected() {
            return Reply::error(ERROR_TCP_CANNOT_SEND_MESSAGE);
        }

        let payload = encode_command(args);
        let (tx, rx) = oneshot::channel();
        {
            // Queue slot and wire write are one atomic step so replies
            // cannot be correlated out of submission order.
            let mut pending = self.shared.pending.lock();
            pending.push_back(Pending::Request(tx));
            if let Err(e) = self.transport.send(payload) {
                pending.pop_back();
                return Reply::error(e.to_string());
            }
        }

        rx.await
            .unwrap_or_else(|_| Reply::error(ERROR_TCP_DISCONNECTED))
    }

    /// Subscribe to a channel.
    ///
    /// The table entry is registered before the wire command is issued, so
    /// a delivery racing the confirmation already finds its stream. Fails
    /// with [`Error::SubscriptionAlreadyExists`] on a duplicate key.
    pub fn subscribe(&self, channel: impl Into<String>) -> Result<Subscription> {
        self.register(channel.into(), SubscriptionKind::Channel)
    }

    /// Subscribe to a glob-style pattern.
    pub fn psubscribe(&self, pattern: impl Into<String>) -> Result<Subscription> {
        self.register(pattern.into(), SubscriptionKind::Pattern)
    }

    /// Unsubscribe from a channel. The table entry is removed only once
    /// the server confirms; the subscription stream then ends.
    pub fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.deregister(channel, SubscriptionKind::Channel)
    }

    /// Unsubscribe from a pattern.
    pub fn punsubscribe(&self, pattern: &str) -> Result<()> {
        self.deregister(pattern, SubscriptionKind::Pattern)
    }

    /// True when the transport is up on both state axes.
    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    /// Tear the connection down for good. No further events are emitted;
    /// the event channel closes once the transport has quiesced.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Resolve once the transport has fully quiesced after
    /// [`disconnect`](Self::disconnect).
    pub async fn join(&self) {
        self.transport.join().await;
    }

    fn register(&self, key: String, kind: SubscriptionKind) -> Result<Subscription> {
        let events = self.shared.subscriptions.lock().insert(&key, kind)?;

        let command = match kind {
            SubscriptionKind::Channel => "SUBSCRIBE",
            SubscriptionKind::Pattern => "PSUBSCRIBE",
        };
        if self.transport.connected() {
            let payload = encode_command(&[command.as_bytes(), key.as_bytes()]);
            let mut pending = self.shared.pending.lock();
            pending.push_back(Pending::Subscribe);
            if let Err(e) = self.transport.send(payload) {
                pending.pop_back();
                warn!("failed to issue {command} for {key:?}: {e}");
            }
        } else {
            // The entry is dropped with the rest of the table on the next
            // successful connect; its stream ends without a confirmation.
            warn!("transport is down; {command} for {key:?} not issued");
        }

        Ok(Subscription::new(key, events))
    }

    fn deregister(&self, key: &str, kind: SubscriptionKind) -> Result<()> {
        self.shared.subscriptions.lock().expect(key, kind)?;

        let command = match kind {
            SubscriptionKind::Channel => "UNSUBSCRIBE",
            SubscriptionKind::Pattern => "PUNSUBSCRIBE",
        };
        // No pending slot: the confirmation arrives as a push array and is
        // intercepted, never matched against the queue.
        if self.transport.connected() {
            if let Err(e) = self
                .transport
                .send(encode_command(&[command.as_bytes(), key.as_bytes()]))
            {
                warn!("failed to issue {command} for {key:?}: {e}");
            }
        }
        Ok(())
    }
}

/// Consume transport events until the driver quiesces.
async fn dispatch(
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent<Reply>>,
    transport: Transport,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(event) = transport_events.recv().await {
        match event {
            TransportEvent::Connected => {
                // Server-side subscription state died with the previous
                // socket; end all streams and leave pub/sub mode.
                shared.subscriptions.lock().clear();
                let _ = events.send(ConnectionEvent::Connected);
            }
            TransportEvent::ConnectFailed(e) => {
                let _ = events.send(ConnectionEvent::ConnectFailed(e));
            }
            TransportEvent::Disconnected(e) => {
                shared.drain_pending(ERROR_TCP_DISCONNECTED);
                let _ = events.send(ConnectionEvent::Disconnected(e));
            }
            TransportEvent::Message(reply) => handle_reply(&transport, &shared, reply),
        }
    }

    // Caller-initiated teardown. Lifecycle hooks stay silent, but nobody
    // is left hanging: callers still awaiting a reply are resolved and
    // every subscription stream ends.
    shared.drain_pending(ERROR_TCP_DISCONNECTED);
    shared.subscriptions.lock().clear();
}

fn handle_reply(transport: &Transport, shared: &Shared, reply: Reply) {
    // Push arrays are intercepted only while something is subscribed;
    // outside pub/sub mode every reply correlates with the queue.
    if !shared.subscriptions.lock().is_empty() && is_push(&reply) {
        if !route_push(shared, &reply) {
            protocol_violation(transport, "malformed or unmatched pub/sub push", &reply);
        }
        return;
    }

    let slot = shared.pending.lock().pop_front();
    match slot {
        None => protocol_violation(transport, "reply with no pending request", &reply),
        Some(Pending::Request(tx)) => {
            let _ = tx.send(reply);
        }
        Some(Pending::Subscribe) => {
            if !route_subscribe_confirmation(shared, &reply) {
                protocol_violation(transport, "malformed subscribe confirmation", &reply);
            }
        }
    }
}

/// A spurious or malformed reply means client and server no longer agree
/// on the stream position. Drop the reply, log, and force a fresh socket.
fn protocol_violation(transport: &Transport, what: &str, reply: &Reply) {
    error!("protocol violation: {what} ({reply:?}); reconnecting");
    transport.reconnect();
}

/// Does this reply look like an unsolicited pub/sub push?
fn is_push(reply: &Reply) -> bool {
    let Some(items) = reply.as_array() else {
        return false;
    };
    let Some(kind) = items.first().and_then(text) else {
        return false;
    };
    matches!(
        kind.to_ascii_uppercase().as_str(),
        "MESSAGE" | "PMESSAGE" | "UNSUBSCRIBE" | "PUNSUBSCRIBE"
    )
}

/// Route an intercepted push array. Returns false on any structural
/// mismatch or unknown subscription key.
fn route_push(shared: &Shared, reply: &Reply) -> bool {
    let Some(items) = reply.as_array() else {
        return false;
    };
    let Some(kind) = items.first().and_then(text) else {
        return false;
    };

    match kind.to_ascii_uppercase().as_str() {
        "MESSAGE" => {
            let (Some(channel), Some(payload)) = (arg_text(items, 1), arg_blob(items, 2)) else {
                return false;
            };
            shared.subscriptions.lock().deliver(
                &channel,
                PushEvent::Message {
                    channel: channel.clone(),
                    payload,
                },
            )
        }
        "PMESSAGE" => {
            let (Some(pattern), Some(channel), Some(payload)) =
                (arg_text(items, 1), arg_text(items, 2), arg_blob(items, 3))
            else {
                return false;
            };
            shared.subscriptions.lock().deliver(
                &pattern,
                PushEvent::PMessage {
                    pattern: pattern.clone(),
                    channel,
                    payload,
                },
            )
        }
        "UNSUBSCRIBE" | "PUNSUBSCRIBE" => {
            let (Some(key), Some(_count)) = (arg_text(items, 1), arg_integer(items, 2)) else {
                return false;
            };
            shared.subscriptions.lock().remove(&key)
        }
        _ => false,
    }
}

/// Route a subscribe/psubscribe confirmation that arrived through the
/// pending queue: `[subscribe|psubscribe, key, count]`.
fn route_subscribe_confirmation(shared: &Shared, reply: &Reply) -> bool {
    let Some(items) = reply.as_array() else {
        return false;
    };
    let Some(kind) = items.first().and_then(text) else {
        return false;
    };
    if !matches!(
        kind.to_ascii_uppercase().as_str(),
        "SUBSCRIBE" | "PSUBSCRIBE"
    ) {
        return false;
    }
    let (Some(key), Some(_count)) = (arg_text(items, 1), arg_integer(items, 2)) else {
        return false;
    };
    shared
        .subscriptions
        .lock()
        .deliver(&key, PushEvent::Subscribed)
}

fn text(reply: &Reply) -> Option<String> {
    match reply {
        Reply::Simple(s) => Some(s.clone()),
        Reply::Bulk(b) => std::str::from_utf8(b).ok().map(str::to_string),
        _ => None,
    }
}

fn arg_text(items: &[Reply], index: usize) -> Option<String> {
    items.get(index).and_then(text)
}

fn arg_blob(items: &[Reply], index: usize) -> Option<Bytes> {
    match items.get(index)? {
        Reply::Bulk(b) => Some(b.clone()),
        Reply::Simple(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
        _ => None,
    }
}

fn arg_integer(items: &[Reply], index: usize) -> Option<i64> {
    items.get(index)?.as_integer()
}
