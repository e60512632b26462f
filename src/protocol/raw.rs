//! Pass-through codec: every read is one opaque message.
//!
//! Useful for transports that carry unframed byte streams, and as the
//! simplest possible [`Codec`] for exercising the transport itself.

use super::Codec;
use crate::error::ProtocolError;
use bytes::Bytes;

/// Codec that forwards whatever bytes are available as a single message.
#[derive(Debug, Default)]
pub struct RawCodec;

impl RawCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for RawCodec {
    type Message = Bytes;

    fn parse(&mut self, input: &[u8]) -> Result<Option<(usize, Bytes)>, ProtocolError> {
        if input.is_empty() {
            return Ok(None);
        }
        Ok(Some((input.len(), Bytes::copy_from_slice(input))))
    }
}
