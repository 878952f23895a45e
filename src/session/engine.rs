//! Single-slot expectation state machine

use super::builder::DEFAULT_MAX_BUFFER_SIZE;
use crate::buffer::AccumBuffer;
use crate::pattern::{Expect, MatchOutcome, Rejection};
use crate::result::{ExpectError, Matched};
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<Matched, ExpectError>>;

struct Pending {
    kind: Expect,
    reply: Reply,
}

/// What happened to a delivered payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fed {
    /// No live expectation; the bytes were buffered.
    Unsolicited,
    /// The expectation needs more bytes.
    Pending,
    /// The expectation resolved.
    Resolved,
    /// The expectation was rejected.
    Rejected,
    /// The buffer passed its limit; this many bytes were discarded.
    Overflow(usize),
}

/// Owns the accumulation buffer and at most one pending expectation.
///
/// The kind and its reply channel are installed and removed together.
/// Bytes that stay unmatched past `limit` are dropped and the pending
/// expectation fails with [`ExpectError::BufferFull`].
pub(crate) struct Engine {
    buffer: AccumBuffer,
    pending: Option<Pending>,
    limit: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_SIZE)
    }
}

impl Engine {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: AccumBuffer::new(),
            pending: None,
            limit: limit.max(1),
        }
    }

    /// Install an expectation and drain whatever is already buffered into it.
    ///
    /// A previous expectation whose caller has gone away does not count as
    /// pending.
    pub fn install(
        &mut self,
        kind: Expect,
    ) -> Result<oneshot::Receiver<Result<Matched, ExpectError>>, ExpectError> {
        if self.pending.as_ref().is_some_and(|p| !p.reply.is_closed()) {
            return Err(ExpectError::Busy);
        }

        let (reply, rx) = oneshot::channel();
        self.pending = Some(Pending { kind, reply });
        if !self.buffer.is_empty() {
            self.run(None);
        }
        Ok(rx)
    }

    /// Deliver an inbound payload.
    pub fn feed(&mut self, chunk: &[u8]) -> Fed {
        self.run(Some(chunk))
    }

    /// Drop the pending expectation if its caller has stopped waiting.
    pub fn clear_abandoned(&mut self) {
        if self.pending.as_ref().is_some_and(|p| p.reply.is_closed()) {
            self.pending = None;
        }
    }

    /// Fail the pending expectation, if any.
    pub fn fail(&mut self, error: ExpectError) {
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(error));
        }
    }

    /// Kind of the live pending expectation
    pub fn pending(&self) -> Option<Expect> {
        self.pending
            .as_ref()
            .filter(|p| !p.reply.is_closed())
            .map(|p| p.kind)
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn run(&mut self, chunk: Option<&[u8]>) -> Fed {
        let pending = match self.pending.take() {
            Some(pending) if !pending.reply.is_closed() => pending,
            _ => {
                if let Some(data) = chunk {
                    self.buffer.append(data);
                }
                return match self.overflow() {
                    Some(discarded) => Fed::Overflow(discarded),
                    None => Fed::Unsolicited,
                };
            }
        };

        match pending.kind.feed(&mut self.buffer, chunk) {
            MatchOutcome::Pending => match self.overflow() {
                Some(discarded) => {
                    let error = ExpectError::BufferFull { limit: self.limit };
                    let _ = pending.reply.send(Err(error));
                    Fed::Overflow(discarded)
                }
                None => {
                    self.pending = Some(pending);
                    Fed::Pending
                }
            },
            MatchOutcome::Resolved(matched) => {
                let _ = pending.reply.send(Ok(matched));
                Fed::Resolved
            }
            MatchOutcome::Rejected(rejection) => {
                let error = match rejection {
                    Rejection::Mismatch => ExpectError::Rejected,
                    Rejection::Decode(e) => ExpectError::Decode(e),
                };
                let _ = pending.reply.send(Err(error));
                Fed::Rejected
            }
        }
    }

    /// Empty the buffer if it grew past the limit.
    fn overflow(&mut self) -> Option<usize> {
        if self.buffer.len() <= self.limit {
            return None;
        }
        Some(self.buffer.take_all().len())
    }
}
