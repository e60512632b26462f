//! Reconnecting TCP transport.
//!
//! A [`Transport`] drives one TCP connection through connect, read, write
//! and retry. Inbound bytes are framed by a [`Codec`] and delivered, along
//! with connect and loss notifications, on an event channel consumed by
//! the layer above. Outbound payloads go through a byte-capped FIFO queue
//! drained by a writer task.
//!
//! Connection state is tracked on two independent axes: what the caller
//! wants (administrative) and what the socket is actually doing
//! (observable). `connected()` is their conjunction; the retry loop runs
//! only while the caller still wants the connection up.

mod options;
mod queue;
mod socket;

pub use options::TransportOptions;

use crate::error::{Error, Result};
use crate::protocol::{Codec, ReadBuffer};
use bytes::Bytes;
use queue::SendQueue;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

/// Caller intent: is the connection supposed to be up?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    /// The caller has torn the transport down (or never brought it up).
    Disconnected,
    /// The caller wants the connection up; losses are retried.
    Connected,
}

/// What the socket is actually doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No socket, no attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The socket is established.
    Connected,
}

/// Snapshot of both state axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStatus {
    /// Administrative axis (caller intent).
    pub admin: AdminState,
    /// Observable axis (socket reality).
    pub socket: SocketState,
}

impl TransportStatus {
    /// True when both axes are connected.
    #[inline]
    pub fn connected(&self) -> bool {
        self.admin == AdminState::Connected && self.socket == SocketState::Connected
    }

    fn idle(&self) -> bool {
        self.admin == AdminState::Disconnected && self.socket == SocketState::Disconnected
    }
}

/// Notifications delivered to the layer above.
#[derive(Debug)]
pub enum TransportEvent<M> {
    /// A connect attempt succeeded; the read loop is running.
    Connected,
    /// A connect attempt failed. The retry policy decides what happens
    /// next.
    ConnectFailed(Error),
    /// An established session was lost. Emitted at most once per session;
    /// never emitted for a caller-initiated teardown.
    Disconnected(Error),
    /// One decoded inbound message.
    Message(M),
}

enum Control {
    /// Caller-initiated teardown: silent, final.
    Shutdown,
    /// Upper-layer-initiated teardown: drop the socket, keep the intent,
    /// go through the retry path.
    Reconnect,
}

enum SessionEnd {
    Shutdown,
    Lost(Error),
}

/// Handle to a reconnecting TCP transport.
///
/// Cheap to clone. `send` may be called from any thread; everything else
/// is asynchronous messaging with the driver task.
#[derive(Clone)]
pub struct Transport {
    queue: Arc<SendQueue>,
    control: mpsc::UnboundedSender<Control>,
    status_rx: watch::Receiver<TransportStatus>,
}

impl Transport {
    /// Start a transport for the given endpoint and spawn its driver task.
    ///
    /// Returns the handle and the event channel. Events stop (and the
    /// channel closes) once the driver has fully quiesced; dropping the
    /// receiver makes the driver shut itself down.
    pub fn connect<C>(
        options: TransportOptions,
        codec: C,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent<C::Message>>)
    where
        C: Codec + Send + 'static,
        C::Message: Send + 'static,
    {
        let queue = Arc::new(SendQueue::new(options.send_buffer_limit));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(TransportStatus {
            admin: AdminState::Connected,
            socket: SocketState::Connecting,
        });

        let driver = Driver {
            codec,
            options,
            queue: Arc::clone(&queue),
            control: control_rx,
            events: events_tx,
            status: status_tx,
        };
        tokio::spawn(driver.run());

        (
            Self {
                queue,
                control: control_tx,
                status_rx,
            },
            events_rx,
        )
    }

    /// Queue a payload for transmission.
    ///
    /// Callable from any thread. Payloads queued while the socket is down
    /// are discarded on the next successful connect; reply-level
    /// accounting is the caller's concern.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        self.queue.push(payload)
    }

    /// Snapshot of both state axes.
    pub fn status(&self) -> TransportStatus {
        *self.status_rx.borrow()
    }

    /// True when the caller wants the connection up and the socket agrees.
    pub fn connected(&self) -> bool {
        self.status().connected()
    }

    /// Tear the transport down for good. Cancels any retry, closes the
    /// socket, and suppresses further events: the teardown itself is not
    /// notified.
    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Shutdown);
    }

    /// Drop the current socket and go through the retry path, keeping the
    /// administrative intent. Used by the layer above on protocol
    /// violations.
    pub fn reconnect(&self) {
        let _ = self.control.send(Control::Reconnect);
    }

    /// Resolve once both state axes are `Disconnected` and the driver has
    /// quiesced.
    pub async fn join(&self) {
        let mut status_rx = self.status_rx.clone();
        let _ = status_rx.wait_for(TransportStatus::idle).await;
    }
}

struct Driver<C: Codec> {
    codec: C,
    options: TransportOptions,
    queue: Arc<SendQueue>,
    control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<TransportEvent<C::Message>>,
    status: watch::Sender<TransportStatus>,
}

impl<C: Codec> Driver<C> {
    async fn run(mut self) {
        'retry: loop {
            self.set_status(AdminState::Connected, SocketState::Connecting);

            let attempt = TcpStream::connect(self.options.addr());
            tokio::pin!(attempt);
            let outcome = loop {
                tokio::select! {
                    res = &mut attempt => break res,
                    ctrl = self.control.recv() => match ctrl {
                        Some(Control::Shutdown) | None => return self.finish(),
                        Some(Control::Reconnect) => continue 'retry,
                    },
                }
            };

            match outcome {
                Ok(stream) => {
                    socket::configure(&stream, &self.options);
                    self.queue.clear();
                    self.set_status(AdminState::Connected, SocketState::Connected);
                    debug!("connected to {}", self.options.addr());
                    if !self.emit(TransportEvent::Connected) {
                        return self.finish();
                    }

                    match self.session(stream).await {
                        SessionEnd::Shutdown => return self.finish(),
                        SessionEnd::Lost(error) => {
                            self.set_status(AdminState::Connected, SocketState::Disconnected);
                            warn!("connection to {} lost: {error}", self.options.addr());
                            if !self.emit(TransportEvent::Disconnected(error)) {
                                return self.finish();
                            }
                        }
                    }
                }
                Err(e) => {
                    self.set_status(AdminState::Connected, SocketState::Disconnected);
                    debug!("connect to {} failed: {e}", self.options.addr());
                    if !self.emit(TransportEvent::ConnectFailed(e.into())) {
                        return self.finish();
                    }
                }
            }

            if self.options.auto_reconnect {
                tokio::select! {
                    _ = time::sleep(self.options.reconnect_wait) => {}
                    ctrl = self.control.recv() => match ctrl {
                        Some(Control::Shutdown) | None => return self.finish(),
                        Some(Control::Reconnect) => {}
                    },
                }
            } else {
                // No retry policy: hold position until the caller decides.
                match self.control.recv().await {
                    Some(Control::Reconnect) => {}
                    Some(Control::Shutdown) | None => return self.finish(),
                }
            }
        }
    }

    /// Run one established session until it ends. Reads land in the parse
    /// buffer's tail; every decoded message goes out as an event.
    async fn session(&mut self, stream: TcpStream) -> SessionEnd {
        let (mut read_half, write_half) = stream.into_split();
        let mut writer: JoinHandle<Error> =
            tokio::spawn(write_loop(write_half, Arc::clone(&self.queue)));
        let mut buffer = ReadBuffer::with_capacity(self.options.read_buffer_capacity);

        let end = loop {
            tokio::select! {
                res = read_half.read(buffer.unfilled()) => match res {
                    Ok(0) => break SessionEnd::Lost(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    ))),
                    Ok(n) => {
                        buffer.advance(n);
                        let events = &self.events;
                        let drained = buffer.drain(&mut self.codec, |message| {
                            let _ = events.send(TransportEvent::Message(message));
                        });
                        if let Err(e) = drained {
                            break SessionEnd::Lost(Error::Protocol(e));
                        }
                    }
                    Err(e) => break SessionEnd::Lost(Error::Io(e)),
                },
                res = &mut writer => {
                    let error = match res {
                        Ok(error) => error,
                        Err(e) => Error::Io(io::Error::other(e)),
                    };
                    break SessionEnd::Lost(error);
                }
                ctrl = self.control.recv() => match ctrl {
                    Some(Control::Shutdown) | None => break SessionEnd::Shutdown,
                    Some(Control::Reconnect) => break SessionEnd::Lost(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "reconnect requested",
                    ))),
                },
            }
        };

        writer.abort();
        end
    }

    fn set_status(&self, admin: AdminState, socket: SocketState) {
        self.status.send_replace(TransportStatus { admin, socket });
    }

    /// Returns false when the receiver is gone and the driver should wind
    /// down.
    fn emit(&self, event: TransportEvent<C::Message>) -> bool {
        self.events.send(event).is_ok()
    }

    fn finish(&self) {
        self.set_status(AdminState::Disconnected, SocketState::Disconnected);
    }
}

/// Drain the send queue head-first into the socket. Partial writes are
/// retried by `write_all`; a payload is popped only once fully written.
async fn write_loop(mut write_half: OwnedWriteHalf, queue: Arc<SendQueue>) -> Error {
    loop {
        let Some(head) = queue.front() else {
            queue.ready().await;
            continue;
        };
        if let Err(e) = write_half.write_all(&head).await {
            return Error::Io(e);
        }
        queue.pop_front();
    }
}
