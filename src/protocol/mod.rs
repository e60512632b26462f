//! Wire framing: the codec contract, the parse buffer, and the codecs.
//!
//! The transport is generic over a [`Codec`]: a stateless incremental
//! parser that turns a prefix of the inbound byte stream into one decoded
//! message at a time. Reads land directly in the writable tail of a
//! [`ReadBuffer`]; after each read the buffer is drained through the codec
//! and surviving partial input is compacted back to offset zero.

mod buffer;
pub mod line;
pub mod raw;
pub mod resp;

pub use buffer::ReadBuffer;
pub use line::LineCodec;
pub use raw::RawCodec;
pub use resp::{encode_command, Reply, RespCodec};

use crate::error::ProtocolError;

/// CRLF terminator bytes.
pub const CRLF: &[u8] = b"\r\n";

/// An incremental framing parser for one wire protocol.
///
/// `parse` inspects a prefix of `input` and either decodes one complete
/// message, reports that more bytes are needed, or rejects structurally
/// invalid input. It must be pure over `input`: partial progress is
/// discarded and the same prefix will be offered again once more bytes
/// have arrived.
pub trait Codec {
    /// The decoded message type.
    type Message;

    /// Try to decode one message from the front of `input`.
    ///
    /// Returns:
    /// - `Ok(Some((consumed, message)))` if a complete message was decoded
    ///   from the first `consumed` bytes
    /// - `Ok(None)` if `input` is a valid but incomplete prefix
    /// - `Err(e)` if `input` can never become a valid message
    fn parse(&mut self, input: &[u8]) -> Result<Option<(usize, Self::Message)>, ProtocolError>;
}
