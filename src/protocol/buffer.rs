//! Fixed-capacity parse buffer.

use super::Codec;
use crate::error::ProtocolError;

/// A fixed-capacity read buffer with a used-bytes watermark.
///
/// Bytes `[0, used)` hold valid unparsed input; the tail `[used, capacity)`
/// is handed to the transport as the destination of the next socket read.
/// The capacity is chosen at construction and never grows: a single
/// message larger than the whole buffer is a fatal protocol error.
pub struct ReadBuffer {
    buf: Box<[u8]>,
    used: usize,
}

impl ReadBuffer {
    /// Create a buffer with the given capacity in bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "read buffer capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of valid unparsed bytes at the front of the buffer.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// The valid unparsed input.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// The writable tail: where the next read should land.
    #[inline]
    pub fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.used..]
    }

    /// Record that `n` bytes were written into the tail.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        assert!(self.used + n <= self.buf.len(), "advance past buffer capacity");
        self.used += n;
    }

    /// Parse as many complete messages as the buffered input allows,
    /// passing each to `sink`, then compact the surviving partial message
    /// to offset zero with a single move.
    ///
    /// Fails with [`ProtocolError::MessageTooLarge`] when the buffer is
    /// full and still does not hold one complete message: no future read
    /// could ever finish it.
    pub fn drain<C, F>(&mut self, codec: &mut C, mut sink: F) -> Result<(), ProtocolError>
    where
        C: Codec,
        F: FnMut(C::Message),
    {
        let mut pos = 0;
        while pos < self.used {
            match codec.parse(&self.buf[pos..self.used])? {
                Some((consumed, message)) => {
                    debug_assert!(consumed > 0, "codec consumed zero bytes");
                    pos += consumed;
                    sink(message);
                }
                None => break,
            }
        }

        if pos > 0 {
            self.buf.copy_within(pos..self.used, 0);
            self.used -= pos;
        } else if self.used == self.buf.len() {
            return Err(ProtocolError::MessageTooLarge {
                capacity: self.buf.len(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ReadBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBuffer")
            .field("capacity", &self.buf.len())
            .field("used", &self.used)
            .finish()
    }
}
