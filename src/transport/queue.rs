//! Outbound send queue.

use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// FIFO queue of encoded payloads awaiting the writer task.
///
/// `push` may be called from any thread; the running byte total is kept
/// under the same lock as the queue so the cap check and the insert are
/// one atomic step. An insert that would breach the cap fails without
/// touching the queue.
pub(crate) struct SendQueue {
    inner: Mutex<Inner>,
    limit: usize,
    ready: Notify,
}

struct Inner {
    payloads: VecDeque<Bytes>,
    bytes: usize,
}

impl SendQueue {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                payloads: VecDeque::new(),
                bytes: 0,
            }),
            limit,
            ready: Notify::new(),
        }
    }

    /// Append a payload, waking the writer. Fails with
    /// [`Error::SendBufferFull`] when the byte cap would be exceeded.
    pub(crate) fn push(&self, payload: Bytes) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.bytes + payload.len() > self.limit {
                return Err(Error::SendBufferFull { limit: self.limit });
            }
            inner.bytes += payload.len();
            inner.payloads.push_back(payload);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Clone of the head payload, if any.
    pub(crate) fn front(&self) -> Option<Bytes> {
        self.inner.lock().payloads.front().cloned()
    }

    /// Drop the head payload after it was fully written.
    pub(crate) fn pop_front(&self) {
        let mut inner = self.inner.lock();
        if let Some(payload) = inner.payloads.pop_front() {
            inner.bytes -= payload.len();
        }
    }

    /// Drop everything queued. Called on each successful connect: bytes
    /// queued against a dead socket are considered lost.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.payloads.clear();
        inner.bytes = 0;
    }

    /// Queued byte total.
    pub(crate) fn bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Wait until `push` signals new work. A wake-up may be spurious;
    /// callers re-check `front`.
    pub(crate) async fn ready(&self) {
        self.ready.notified().await;
    }
}
