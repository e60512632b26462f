//! Newline-delimited codec.

use super::Codec;
use crate::error::ProtocolError;
use memchr::memchr;

/// Codec that yields one message per `\n`-terminated line.
///
/// The terminator is consumed but not included in the message; a trailing
/// `\r` before the terminator is stripped as well.
#[derive(Debug, Default)]
pub struct LineCodec;

impl LineCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for LineCodec {
    type Message = String;

    fn parse(&mut self, input: &[u8]) -> Result<Option<(usize, String)>, ProtocolError> {
        let Some(nl) = memchr(b'\n', input) else {
            return Ok(None);
        };
        let mut line = &input[..nl];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        Ok(Some((nl + 1, String::from_utf8_lossy(line).into_owned())))
    }
}
