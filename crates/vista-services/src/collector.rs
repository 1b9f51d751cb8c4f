//! Byte collector: reassembles one picture from its chunk stream.
//!
//! Each chunk declares how many bytes of the stream follow it. The first
//! chunk therefore fixes the total (`len + remaining`), and every later
//! chunk must account exactly for the drop in the declared remainder.
//! Any inconsistency is fatal for the transfer; there is no resync.

use bytes::{Bytes, BytesMut};

use vista_core::wire::MAX_PAYLOAD;

/// Most a collector reserves up front. The declared total comes from the
/// peer, so anything beyond this grows only as bytes actually arrive.
const MAX_INITIAL_RESERVE: u64 = 4 * MAX_PAYLOAD as u64;

/// Result of pushing one chunk into a [`ByteCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    /// More chunks expected.
    Continue,
    /// Stream finished. The collector must be discarded.
    Complete(Bytes),
    /// The chunk contradicts what earlier chunks declared.
    Malformed(MalformedReason),
}

/// Why a chunk sequence was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("declared remainder did not decrease: {previous} then {next}")]
    NotDecreasing { previous: u64, next: u64 },

    #[error("chunk of {got} bytes does not match remainder drop of {expected}")]
    LengthMismatch { expected: u64, got: u64 },

    #[error("declared stream length overflows")]
    Overflow,

    #[error("declared stream length {total} exceeds limit {limit}")]
    TooLarge { total: u64, limit: u64 },

    #[error("chunk arrived after the stream completed")]
    AfterComplete,
}

/// Accumulates a byte stream of a-priori-unknown length.
#[derive(Debug)]
pub struct ByteCollector {
    buf: BytesMut,
    /// Remainder declared by the last accepted chunk. None before the first.
    remaining: Option<u64>,
    limit: u64,
}

impl ByteCollector {
    /// A collector that rejects streams declaring more than `limit` bytes.
    pub fn new(limit: u64) -> Self {
        Self {
            buf: BytesMut::new(),
            remaining: None,
            limit,
        }
    }

    /// Bytes accepted so far.
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// Append one chunk that is followed by `remaining_after` more bytes.
    pub fn push(&mut self, chunk: &[u8], remaining_after: u64) -> CollectOutcome {
        let len = chunk.len() as u64;

        match self.remaining {
            None => {
                let Some(total) = len.checked_add(remaining_after) else {
                    return CollectOutcome::Malformed(MalformedReason::Overflow);
                };
                if total > self.limit {
                    return CollectOutcome::Malformed(MalformedReason::TooLarge {
                        total,
                        limit: self.limit,
                    });
                }
                self.buf.reserve(total.min(MAX_INITIAL_RESERVE) as usize);
            }
            Some(0) => return CollectOutcome::Malformed(MalformedReason::AfterComplete),
            Some(previous) => {
                if remaining_after >= previous {
                    return CollectOutcome::Malformed(MalformedReason::NotDecreasing {
                        previous,
                        next: remaining_after,
                    });
                }
                let expected = previous - remaining_after;
                if expected != len {
                    return CollectOutcome::Malformed(MalformedReason::LengthMismatch {
                        expected,
                        got: len,
                    });
                }
            }
        }

        self.buf.extend_from_slice(chunk);
        self.remaining = Some(remaining_after);

        if remaining_after == 0 {
            CollectOutcome::Complete(std::mem::take(&mut self.buf).freeze())
        } else {
            CollectOutcome::Continue
        }
    }
}
