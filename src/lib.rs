//! # Filum
//!
//! An auto-reconnecting asynchronous client for RESP key-value servers.
//!
//! Filum layers three things on top of tokio:
//! - A streaming RESP parser with a fixed-capacity, compacting read
//!   buffer, behind a pluggable framing contract
//! - A TCP transport that retries lost connections, caps its outbound
//!   queue, and configures aggressive keep-alive on every socket
//! - A command connection that correlates replies to in-flight requests
//!   in strict FIFO order and multiplexes pub/sub pushes over the same
//!   socket
//!
//! ## Example
//!
//! ```no_run
//! use filum::{Connection, ConnectionEvent, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (connection, mut events) = Connection::connect(TransportOptions::new("127.0.0.1", 6379));
//!
//!     // Wait for the transport to come up.
//!     while let Some(event) = events.recv().await {
//!         if matches!(event, ConnectionEvent::Connected) {
//!             break;
//!         }
//!     }
//!
//!     let reply = connection.execute(&["SET", "greeting", "hello"]).await;
//!     println!("SET -> {reply}");
//!
//!     connection.disconnect();
//!     connection.join().await;
//! }
//! ```

#![warn(
    clippy::all,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_qualifications
)]

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

/// RESP command connection with pub/sub dispatch.
pub mod connection;
/// Error types and result aliases.
pub mod error;
/// Framing contract, parse buffer, and codecs.
pub mod protocol;
/// Reconnecting TCP transport.
pub mod transport;

// ─────────────────────────────────────────────────────────────────────────────
// Common Re-exports
// ─────────────────────────────────────────────────────────────────────────────

// Error handling
pub use error::{Error, ProtocolError, Result};

// Protocol
pub use protocol::{Codec, LineCodec, RawCodec, ReadBuffer, Reply, RespCodec};

// Transport
pub use transport::{AdminState, SocketState, Transport, TransportEvent, TransportOptions, TransportStatus};

// Connection
pub use connection::{
    Connection, ConnectionEvent, PushEvent, Subscription, ERROR_TCP_CANNOT_SEND_MESSAGE,
    ERROR_TCP_DISCONNECTED,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default capacity of the RESP parse buffer (10 KiB).
pub const READ_BUFFER_CAPACITY: usize = 10240;

/// Byte cap on the outbound send queue (10 MiB).
pub const SEND_BUFFER_LIMIT: usize = 10 * 1024 * 1024;

/// Wait between a connection loss and the next connect attempt.
pub const RECONNECT_WAIT: Duration = Duration::from_secs(2);

/// Keep-alive idle time before the first probe.
pub const KEEPALIVE_IDLE: Duration = Duration::from_secs(2);

/// Interval between keep-alive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

/// Unacknowledged probes before the connection is considered dead.
pub const KEEPALIVE_PROBES: u32 = 3;

/// How long a packet may stay unacknowledged before the OS drops the
/// connection.
pub const USER_TIMEOUT: Duration = Duration::from_millis(6000);
