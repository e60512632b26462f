//! Error types for filum.
//!
//! Failures are split the same way the crate is layered: `ProtocolError`
//! covers framing-level problems that are fatal for the connection that
//! produced them, while `Error` covers everything a caller of the
//! transport or command connection can observe.

use std::io;
use thiserror::Error;

/// Result type alias for filum operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for filum.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol parsing errors. Always connection-fatal: the transport
    /// tears the session down and re-enters the retry loop.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors from connect, read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Enqueueing this payload would push the send queue past its byte
    /// cap. The queue is left untouched.
    #[error("send buffer is full (limit: {limit} bytes)")]
    SendBufferFull {
        /// The configured queue cap in bytes.
        limit: usize,
    },

    /// A subscription for this channel or pattern is already registered.
    #[error("subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    /// No subscription is registered for this channel or pattern.
    #[error("subscription does not exist: {0}")]
    SubscriptionDoesNotExist(String),

    /// The transport handle is no longer backed by a driver task.
    #[error("transport is closed")]
    TransportClosed,
}

/// Framing-level errors raised while parsing inbound bytes.
///
/// Implementations never report "not enough bytes" through this type;
/// incomplete input is an `Ok(None)` outcome of
/// [`Codec::parse`](crate::protocol::Codec::parse).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Leading byte is not one of the known RESP type markers.
    #[error("invalid type marker: {0:?}")]
    InvalidTypeMarker(u8),

    /// A line terminator `\n` arrived without a preceding `\r`.
    #[error("line terminator without preceding CR")]
    MissingCr,

    /// Malformed integer field.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string payload is not followed by CRLF.
    #[error("missing CRLF after bulk payload")]
    MissingCrlf,

    /// Declared length is negative and not the nil sentinel `-1`.
    #[error("invalid declared length: {0}")]
    InvalidLength(i64),

    /// A single message exceeds the parse buffer capacity and can never
    /// complete.
    #[error("message exceeds buffer capacity of {capacity} bytes")]
    MessageTooLarge {
        /// Capacity of the parse buffer.
        capacity: usize,
    },
}
