//! Transport configuration.

use crate::{DEFAULT_PORT, READ_BUFFER_CAPACITY, RECONNECT_WAIT, SEND_BUFFER_LIMIT};
use std::time::Duration;

/// Configuration for a [`Transport`](super::Transport).
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Re-enter the retry loop after a connection loss.
    pub auto_reconnect: bool,
    /// Configure OS-level TCP keep-alive on every new socket.
    pub keepalive: bool,
    /// Configure the per-packet TCP user timeout on every new socket.
    pub user_timeout: bool,
    /// Wait between a loss and the next connect attempt.
    pub reconnect_wait: Duration,
    /// Capacity of the parse buffer. A single inbound message larger than
    /// this is a fatal protocol error.
    pub read_buffer_capacity: usize,
    /// Byte cap on the outbound send queue.
    pub send_buffer_limit: usize,
}

impl TransportOptions {
    /// Options for the given endpoint with the crate defaults.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auto_reconnect: true,
            keepalive: true,
            user_timeout: true,
            reconnect_wait: RECONNECT_WAIT,
            read_buffer_capacity: READ_BUFFER_CAPACITY,
            send_buffer_limit: SEND_BUFFER_LIMIT,
        }
    }

    /// The `host:port` form used for connecting.
    pub(crate) fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}
