//! Fixed-capacity I/O buffer with a fill/drain state
//!
//! An [`IoBuffer`] holds either wire bytes (packet buffer) or plaintext
//! (application buffer). Bytes are appended at the write cursor while the
//! buffer is filling and consumed from the read cursor while it is draining.

use crate::error::{Result, SslError};
use std::fmt;

/// Fill/drain state of an [`IoBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Empty and reusable
    Idle,
    /// A producer is writing bytes into the buffer
    Filling,
    /// Bytes are pending delivery to a consumer
    Draining,
}

/// Byte buffer plus its [`BufferState`].
///
/// The capacity is fixed at construction. Not synchronized: the owning
/// channel is the only reader and writer.
pub struct IoBuffer {
    bytes: Box<[u8]>,
    /// Start of the pending bytes
    start: usize,
    /// End of the pending bytes, start of the spare room
    end: usize,
    state: BufferState,
}

impl IoBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        IoBuffer {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            state: BufferState::Idle,
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == BufferState::Idle
    }

    pub fn is_filling(&self) -> bool {
        self.state == BufferState::Filling
    }

    pub fn is_draining(&self) -> bool {
        self.state == BufferState::Draining
    }

    /// Whether a producer may append bytes (`Idle` or `Filling`)
    pub fn can_fill(&self) -> bool {
        self.state != BufferState::Draining
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Room left after the pending bytes
    pub fn remaining_capacity(&self) -> usize {
        self.bytes.len() - self.end
    }

    /// Number of pending bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Pending bytes, oldest first
    pub fn pending(&self) -> &[u8] {
        &self.bytes[self.start..self.end]
    }

    /// Spare room for the producer. Switches the buffer to `Filling`.
    ///
    /// A draining buffer that still holds bytes is compacted first so the
    /// unconsumed tail (e.g. a partial record) stays in front of new input.
    pub fn fill_slot(&mut self) -> &mut [u8] {
        if self.start > 0 {
            self.bytes.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        self.state = BufferState::Filling;
        &mut self.bytes[self.end..]
    }

    /// Record `n` bytes written into the slot from [`IoBuffer::fill_slot`]
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.is_filling(), "commit outside of filling");
        debug_assert!(n <= self.remaining_capacity());
        self.end += n.min(self.remaining_capacity());
    }

    /// End the fill phase: `Draining` if bytes are pending, else `Idle`
    pub fn finish_fill(&mut self) {
        if self.is_empty() {
            self.start = 0;
            self.end = 0;
            self.state = BufferState::Idle;
        } else {
            self.state = BufferState::Draining;
        }
    }

    /// Drop `n` delivered bytes from the front. Returns the bytes still pending.
    pub fn consume(&mut self, n: usize) -> usize {
        debug_assert!(n <= self.len());
        self.start += n.min(self.len());
        self.len()
    }

    /// Reset to `Idle` and rewind for reuse.
    ///
    /// Only legal once draining has completed; otherwise the pending bytes
    /// are kept and `BufferNotDrained` is returned.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_draining() && !self.is_empty() {
            return Err(SslError::BufferNotDrained {
                pending: self.len(),
            });
        }
        self.start = 0;
        self.end = 0;
        self.state = BufferState::Idle;
        Ok(())
    }
}

impl fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuffer")
            .field("state", &self.state)
            .field("pending", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
